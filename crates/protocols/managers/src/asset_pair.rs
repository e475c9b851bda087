//! Asset-pair (RSI trigger) manager driver
//!
//! Same two-phase shape as the MACO manager, with an RSI reading in place of
//! the crossover: bullish moves the base-asset allocation to the configured
//! bullish allocation, bearish to its complement. A signal that would leave
//! the allocation where it is cannot be proposed.

use chain_gateway::{ChainClient, ContractCall, ContractGateway, TxOptions};
use setkit_core::{Address, Quantity, Result, StrategyError, TxHash};

use crate::calculator::{
    allocation_target, check_confirmation_window, check_no_pending_proposal, RsiBounds,
};
use crate::guards::{availability, ensure_ready_to_propose};
use crate::state::{AssetPairConfirmation, AssetPairManagerDetails, Signal};

/// Signal and the allocation it leads to, if it moves the allocation
fn evaluate_signal(details: &AssetPairManagerDetails) -> Result<(Signal, Quantity)> {
    let record = &details.record;
    let bounds = RsiBounds {
        lower: record.rsi_lower_bound,
        upper: record.rsi_upper_bound,
    };
    let signal = bounds.signal(details.rsi)?;
    let target = allocation_target(
        signal,
        record.bullish_base_asset_allocation,
        record.allocation_precision,
    )?;
    if target == details.base_asset_allocation {
        return Err(StrategyError::AllocationUnchanged { allocation: target }.into());
    }
    Ok((signal, target))
}

fn check_initial_propose(details: &AssetPairManagerDetails) -> Result<(Signal, Quantity)> {
    ensure_ready_to_propose(
        details.rebalance_state,
        details.last_rebalance_timestamp,
        details.rebalance_interval,
        details.now,
        "initialPropose",
    )?;
    check_no_pending_proposal(
        details.recent_initial_propose_timestamp,
        details.record.signal_confirmation_max_time,
        details.now,
    )?;
    evaluate_signal(details)
}

fn check_confirm_propose(details: &AssetPairManagerDetails) -> Result<(Signal, Quantity)> {
    ensure_ready_to_propose(
        details.rebalance_state,
        details.last_rebalance_timestamp,
        details.rebalance_interval,
        details.now,
        "confirmPropose",
    )?;
    check_confirmation_window(
        details.recent_initial_propose_timestamp,
        details.now,
        details.record.signal_confirmation_min_time,
        details.record.signal_confirmation_max_time,
    )?;
    evaluate_signal(details)
}

/// Driver for asset-pair strategy managers
#[derive(Clone)]
pub struct AssetPairManagerDriver {
    client: ChainClient,
}

impl AssetPairManagerDriver {
    pub fn new(client: ChainClient) -> Self {
        Self { client }
    }

    pub async fn fetch_details(&self, manager: Address) -> Result<AssetPairManagerDetails> {
        let record = self.client.asset_pair_manager(manager).await?;
        let rb = record.rebalancing_set;

        let (
            (recent_initial_propose_timestamp, base_asset_allocation, now),
            (rebalance_state, last_rebalance_timestamp, rebalance_interval),
            rsi,
        ) = tokio::try_join!(
            async {
                tokio::try_join!(
                    self.client.asset_pair_recent_initial_propose_timestamp(manager),
                    self.client.asset_pair_base_asset_allocation(manager),
                    self.client.latest_block_timestamp(),
                )
            },
            async {
                tokio::try_join!(
                    self.client.rebalancing_state(rb),
                    self.client.rebalancing_last_rebalance_timestamp(rb),
                    self.client.rebalancing_interval(rb),
                )
            },
            self.client
                .oracle_read_period(record.trigger_oracle, record.rsi_period),
        )?;

        Ok(AssetPairManagerDetails {
            manager,
            record,
            recent_initial_propose_timestamp,
            base_asset_allocation,
            rebalance_state,
            last_rebalance_timestamp,
            rebalance_interval,
            rsi,
            now,
        })
    }

    pub async fn can_initial_propose(&self, manager: Address) -> Result<bool> {
        let details = self.fetch_details(manager).await?;
        availability(check_initial_propose(&details).map(|_| ()))
    }

    pub async fn can_confirm_propose(&self, manager: Address) -> Result<bool> {
        let details = self.fetch_details(manager).await?;
        availability(check_confirm_propose(&details).map(|_| ()))
    }

    pub async fn initial_propose(&self, manager: Address, caller: Address) -> Result<TxHash> {
        let details = self.fetch_details(manager).await?;
        let (signal, target) = check_initial_propose(&details)?;

        let tx_hash = self
            .client
            .send_transaction(
                ContractCall::ManagerInitialPropose { manager },
                TxOptions::new(caller),
            )
            .await?;

        tracing::info!(
            manager = ?manager,
            signal = ?signal,
            rsi = %details.rsi,
            target_allocation = %target,
            tx_hash = ?tx_hash,
            "Asset-pair initial propose submitted"
        );
        Ok(tx_hash)
    }

    pub async fn confirm_propose(
        &self,
        manager: Address,
        caller: Address,
    ) -> Result<AssetPairConfirmation> {
        let details = self.fetch_details(manager).await?;
        let (signal, new_allocation) = check_confirm_propose(&details)?;

        let tx_hash = self
            .client
            .send_transaction(
                ContractCall::ManagerConfirmPropose { manager },
                TxOptions::new(caller),
            )
            .await?;

        tracing::info!(
            manager = ?manager,
            signal = ?signal,
            previous_allocation = %details.base_asset_allocation,
            new_allocation = %new_allocation,
            tx_hash = ?tx_hash,
            "Asset-pair proposal confirmed"
        );
        Ok(AssetPairConfirmation {
            tx_hash,
            signal,
            new_allocation,
        })
    }
}
