//! Set token checks

use chain_gateway::{probe_interface, ChainClient, ContractGateway, Interface};
use setkit_core::units::mul_div_floor;
use setkit_core::{Address, ProtocolError, Quantity, Result};

use crate::common::{is_multiple_of, same_length};
use crate::erc20::{has_sufficient_allowance, has_sufficient_balance};

pub async fn implements_set(client: &ChainClient, candidate: Address) -> Result<()> {
    probe_interface(client, candidate, Interface::Set).await
}

pub async fn implements_rebalancing_set(client: &ChainClient, candidate: Address) -> Result<()> {
    probe_interface(client, candidate, Interface::RebalancingSet).await
}

pub async fn implements_core(client: &ChainClient, candidate: Address) -> Result<()> {
    probe_interface(client, candidate, Interface::Core).await
}

pub async fn implements_erc20(client: &ChainClient, candidate: Address) -> Result<()> {
    probe_interface(client, candidate, Interface::Erc20).await
}

/// Fail unless `quantity` is a multiple of the Set's natural unit
pub async fn is_multiple_of_natural_unit(
    client: &ChainClient,
    set: Address,
    quantity: Quantity,
) -> Result<()> {
    let natural_unit = client.set_natural_unit(set).await?;
    is_multiple_of(quantity, natural_unit, "natural unit")
}

/// Fail unless `set` was created through `core`'s factories
pub async fn is_valid_set(client: &ChainClient, core: Address, set: Address) -> Result<()> {
    if !client.core_valid_set(core, set).await? {
        return Err(ProtocolError::InvalidSet { set, core }.into());
    }
    Ok(())
}

/// Component amounts needed to issue (or released by redeeming) `quantity` of a Set
///
/// `units[i] * quantity / natural_unit` for every component.
pub fn component_quantities(
    units: &[Quantity],
    natural_unit: Quantity,
    quantity: Quantity,
) -> Result<Vec<Quantity>> {
    units
        .iter()
        .map(|unit| Ok(mul_div_floor(*unit, quantity, natural_unit, "component quantity")?))
        .collect()
}

/// Fail unless `owner` holds and has approved every component needed to
/// issue `quantity` of `set` through `transfer_proxy`
pub async fn has_sufficient_balances_for_issue(
    client: &ChainClient,
    set: Address,
    owner: Address,
    transfer_proxy: Address,
    quantity: Quantity,
) -> Result<()> {
    let (components, units, natural_unit) = tokio::try_join!(
        client.set_components(set),
        client.set_units(set),
        client.set_natural_unit(set),
    )?;
    same_length("components", &components, "units", &units)?;
    is_multiple_of(quantity, natural_unit, "natural unit")?;

    let required = component_quantities(&units, natural_unit, quantity)?;
    for (token, amount) in components.iter().zip(required) {
        has_sufficient_balance(client, *token, owner, amount).await?;
        has_sufficient_allowance(client, *token, owner, transfer_proxy, amount).await?;
    }
    Ok(())
}

/// Fail unless every token in `tokens` is a component of `set`
pub async fn receive_tokens_are_components(
    client: &ChainClient,
    set: Address,
    tokens: &[Address],
) -> Result<()> {
    let components = client.set_components(set).await?;
    match tokens.iter().find(|t| !components.contains(t)) {
        Some(token) => Err(ProtocolError::TokenNotInSet { token: *token, set }.into()),
        None => Ok(()),
    }
}
