//! Composite reads of Set and rebalancing Set state
//!
//! Each fetch issues its independent reads concurrently and joins them; a
//! single failing read fails the whole fetch, so no partial details are
//! ever returned.

use chain_gateway::{ChainClient, ContractGateway};
use set_assertions::same_length;
use setkit_core::{Address, Quantity, Result, SetTokenDetails};

use crate::state::{ProposalDetails, RebalanceDetails, RebalancingSetDetails};

/// Fetch name, symbol, natural unit, components and units of a Set
pub async fn fetch_set_details(client: &ChainClient, set: Address) -> Result<SetTokenDetails> {
    let (name, symbol, natural_unit, components, units) = tokio::try_join!(
        client.erc20_name(set),
        client.erc20_symbol(set),
        client.set_natural_unit(set),
        client.set_components(set),
        client.set_units(set),
    )?;

    Ok(SetTokenDetails {
        address: set,
        name,
        symbol,
        natural_unit,
        components,
        units,
    })
}

pub async fn fetch_rebalancing_set_details(
    client: &ChainClient,
    rebalancing_set: Address,
) -> Result<RebalancingSetDetails> {
    let rb = rebalancing_set;
    let (
        (name, symbol, natural_unit, total_supply),
        (manager, current_set, state, unit_shares),
        (last_rebalance_timestamp, rebalance_interval, proposal_period),
    ) = tokio::try_join!(
        async {
            tokio::try_join!(
                client.erc20_name(rb),
                client.erc20_symbol(rb),
                client.set_natural_unit(rb),
                client.erc20_total_supply(rb),
            )
        },
        async {
            tokio::try_join!(
                client.rebalancing_manager(rb),
                client.rebalancing_current_set(rb),
                client.rebalancing_state(rb),
                client.rebalancing_unit_shares(rb),
            )
        },
        async {
            tokio::try_join!(
                client.rebalancing_last_rebalance_timestamp(rb),
                client.rebalancing_interval(rb),
                client.rebalancing_proposal_period(rb),
            )
        },
    )?;

    Ok(RebalancingSetDetails {
        address: rb,
        name,
        symbol,
        manager,
        current_set,
        state,
        natural_unit,
        unit_shares,
        total_supply,
        last_rebalance_timestamp,
        rebalance_interval,
        proposal_period,
    })
}

pub async fn fetch_proposal_details(
    client: &ChainClient,
    rebalancing_set: Address,
) -> Result<ProposalDetails> {
    let (state, next_set, auction_library, proposal_start_time, auction) = tokio::try_join!(
        client.rebalancing_state(rebalancing_set),
        client.rebalancing_next_set(rebalancing_set),
        client.rebalancing_auction_library(rebalancing_set),
        client.rebalancing_proposal_start_time(rebalancing_set),
        client.rebalancing_auction_parameters(rebalancing_set),
    )?;

    Ok(ProposalDetails {
        state,
        next_set,
        auction_library,
        proposal_start_time,
        auction,
    })
}

pub async fn fetch_rebalance_details(
    client: &ChainClient,
    rebalancing_set: Address,
) -> Result<RebalanceDetails> {
    let rb = rebalancing_set;
    let (
        state,
        auction,
        bidding,
        auction_library,
        combined_token_array,
        combined_current_units,
        combined_next_units,
    ) = tokio::try_join!(
        client.rebalancing_state(rb),
        client.rebalancing_auction_parameters(rb),
        client.rebalancing_bidding_parameters(rb),
        client.rebalancing_auction_library(rb),
        client.rebalancing_combined_token_array(rb),
        client.rebalancing_combined_current_units(rb),
        client.rebalancing_combined_next_units(rb),
    )?;
    same_length(
        "combined token array",
        &combined_token_array,
        "combined current units",
        &combined_current_units,
    )?;
    same_length(
        "combined token array",
        &combined_token_array,
        "combined next units",
        &combined_next_units,
    )?;
    // The divisor lives on the curve, so it waits for the library address
    let price_divisor = client.price_curve_divisor(auction_library).await?;

    Ok(RebalanceDetails {
        state,
        auction,
        bidding,
        price_divisor,
        combined_token_array,
        combined_current_units,
        combined_next_units,
    })
}

/// Vault balances of `owner` for each token, in order
pub async fn fetch_vault_balances(
    client: &ChainClient,
    vault: Address,
    tokens: &[Address],
    owner: Address,
) -> Result<Vec<Quantity>> {
    let mut balances = Vec::with_capacity(tokens.len());
    for token in tokens {
        balances.push(client.vault_balance(vault, *token, owner).await?);
    }
    Ok(balances)
}
