//! Issue and redeem Sets through Core
//!
//! Each operation runs its checks with read-only calls and then submits a
//! single transaction, so a failure never leaves intermediate on-chain state.

use chain_gateway::{ChainClient, ContractCall, ContractGateway, TxOptions};
use serde::{Deserialize, Serialize};
use set_assertions::{
    component_quantities, has_sufficient_balance, has_sufficient_balances_for_issue,
    implements_set, is_multiple_of_natural_unit, is_positive_quantity, is_valid_set,
    receive_tokens_are_components, same_length,
};
use setkit_core::{
    Address, AddressKey, ProtocolAddresses, Quantity, Result, TxHash, ValidationError,
};

/// What issuing needs of one component, and what the owner already has
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRequirement {
    pub token: Address,
    pub required: Quantity,
    pub wallet_balance: Quantity,
    pub vault_balance: Quantity,
    /// Zero when wallet and vault together cover `required`
    pub shortfall: Quantity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedeemOptions {
    /// Send the released components to the caller's wallet
    pub withdraw: bool,
    /// Components to leave in the vault when withdrawing
    pub tokens_to_exclude: Vec<Address>,
}

/// Bitmask over component indexes, as `redeemAndWithdrawTo` expects it.
/// Only the first 256 components are addressable.
pub fn exclusion_mask(components: &[Address], excluded: &[Address]) -> Result<Quantity> {
    let mut mask = Quantity::zero();
    for (index, component) in components.iter().enumerate() {
        if !excluded.contains(component) {
            continue;
        }
        if index >= 256 {
            return Err(ValidationError::InvalidQuantity {
                name: "tokens to exclude".to_string(),
                reason: format!("component index {} does not fit a 256-bit mask", index),
            }
            .into());
        }
        mask = mask | (Quantity::one() << index);
    }
    Ok(mask)
}

#[derive(Clone)]
pub struct IssuanceApi {
    client: ChainClient,
    addresses: ProtocolAddresses,
}

impl IssuanceApi {
    pub fn new(client: ChainClient, addresses: ProtocolAddresses) -> Self {
        Self { client, addresses }
    }

    /// Issue `quantity` of `set` from components in `caller`'s wallet
    pub async fn issue(&self, set: Address, quantity: Quantity, caller: Address) -> Result<TxHash> {
        let core = self.addresses.require(AddressKey::Core)?;
        let transfer_proxy = self.addresses.require(AddressKey::TransferProxy)?;

        is_positive_quantity("issue quantity", quantity)?;
        implements_set(&self.client, set).await?;
        is_valid_set(&self.client, core, set).await?;
        has_sufficient_balances_for_issue(&self.client, set, caller, transfer_proxy, quantity)
            .await?;

        let tx_hash = self
            .client
            .send_transaction(
                ContractCall::CoreIssue {
                    core,
                    set,
                    quantity,
                },
                TxOptions::new(caller),
            )
            .await?;

        tracing::info!(set = ?set, quantity = %quantity, tx_hash = ?tx_hash, "Set issued");
        Ok(tx_hash)
    }

    /// Redeem `quantity` of `set`; components stay in the vault unless
    /// `options.withdraw` is set
    pub async fn redeem(
        &self,
        set: Address,
        quantity: Quantity,
        caller: Address,
        options: &RedeemOptions,
    ) -> Result<TxHash> {
        let core = self.addresses.require(AddressKey::Core)?;

        is_positive_quantity("redeem quantity", quantity)?;
        implements_set(&self.client, set).await?;
        is_multiple_of_natural_unit(&self.client, set, quantity).await?;
        has_sufficient_balance(&self.client, set, caller, quantity).await?;

        let call = if options.withdraw {
            receive_tokens_are_components(&self.client, set, &options.tokens_to_exclude).await?;
            let components = self.client.set_components(set).await?;
            ContractCall::CoreRedeemAndWithdrawTo {
                core,
                set,
                to: caller,
                quantity,
                tokens_to_exclude: exclusion_mask(&components, &options.tokens_to_exclude)?,
            }
        } else {
            ContractCall::CoreRedeem {
                core,
                set,
                quantity,
            }
        };

        let tx_hash = self
            .client
            .send_transaction(call, TxOptions::new(caller))
            .await?;

        tracing::info!(
            set = ?set,
            quantity = %quantity,
            withdraw = options.withdraw,
            tx_hash = ?tx_hash,
            "Set redeemed"
        );
        Ok(tx_hash)
    }

    /// Per-component amounts needed to issue `quantity` and what `owner`
    /// still lacks after counting wallet and vault balances
    pub async fn calculate_required_components(
        &self,
        set: Address,
        owner: Address,
        quantity: Quantity,
    ) -> Result<Vec<ComponentRequirement>> {
        let vault = self.addresses.require(AddressKey::Vault)?;
        let (components, units, natural_unit) = tokio::try_join!(
            self.client.set_components(set),
            self.client.set_units(set),
            self.client.set_natural_unit(set),
        )?;
        same_length("components", &components, "units", &units)?;
        let required = component_quantities(&units, natural_unit, quantity)?;

        let mut requirements = Vec::with_capacity(components.len());
        for (token, required) in components.into_iter().zip(required) {
            let (wallet_balance, vault_balance) = tokio::try_join!(
                self.client.erc20_balance_of(token, owner),
                self.client.vault_balance(vault, token, owner),
            )?;
            let shortfall = required.saturating_sub(wallet_balance.saturating_add(vault_balance));
            requirements.push(ComponentRequirement {
                token,
                required,
                wallet_balance,
                vault_balance,
                shortfall,
            });
        }
        Ok(requirements)
    }
}
