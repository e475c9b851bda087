//! Moving-average crossover (MACO) manager driver
//!
//! The manager holds either a risk-asset collateral Set or a stable-asset
//! collateral Set. A rebalance into the other one is permitted when the spot
//! price crosses the moving average away from the current holding, and the
//! crossover still holds after a confirmation delay:
//!
//! 1. `initial_propose`: crossover holds, records the confirmation timestamp
//! 2. `confirm_propose`: within `[min, max]` of step 1 and the crossover
//!    still holds; the manager proposes the other collateral

use chain_gateway::{ChainClient, ContractCall, ContractGateway, MacoManagerRecord, TxOptions};
use rebalancing::{fetch_set_details, RebalancingCoordinator};
use setkit_core::units::ether;
use setkit_core::{
    Address, Error, ProtocolAddresses, ProtocolError, Quantity, Result, SetTokenDetails, TxHash,
};

use crate::calculator::{
    calculate_auction_price_parameters, calculate_set_dollar_value, check_confirmation_window,
    check_crossover, check_no_pending_proposal, classify_holding,
};
use crate::guards::{availability, ensure_ready_to_propose};
use crate::state::{Holding, MacoConfirmation, MacoManagerDetails, MacoProposalPreview};

fn check_initial_propose(details: &MacoManagerDetails) -> Result<Holding> {
    let record = &details.record;
    ensure_ready_to_propose(
        details.rebalance_state,
        details.last_rebalance_timestamp,
        details.rebalance_interval,
        details.now,
        "initialPropose",
    )?;
    check_no_pending_proposal(
        details.last_crossover_confirmation_timestamp,
        record.crossover_confirmation_max_time,
        details.now,
    )?;
    let holding = classify_holding(
        details.current_set,
        record.risk_collateral,
        record.stable_collateral,
    )?;
    check_crossover(holding, details.price, details.moving_average)?;
    Ok(holding)
}

fn check_confirm_propose(details: &MacoManagerDetails) -> Result<Holding> {
    let record = &details.record;
    ensure_ready_to_propose(
        details.rebalance_state,
        details.last_rebalance_timestamp,
        details.rebalance_interval,
        details.now,
        "confirmPropose",
    )?;
    check_confirmation_window(
        details.last_crossover_confirmation_timestamp,
        details.now,
        record.crossover_confirmation_min_time,
        record.crossover_confirmation_max_time,
    )?;
    let holding = classify_holding(
        details.current_set,
        record.risk_collateral,
        record.stable_collateral,
    )?;
    check_crossover(holding, details.price, details.moving_average)?;
    Ok(holding)
}

/// The collateral the manager moves into from `holding`
fn next_collateral(record: &MacoManagerRecord, holding: Holding) -> Address {
    match holding {
        Holding::RiskAsset => record.stable_collateral,
        Holding::StableAsset => record.risk_collateral,
    }
}

/// Driver for MACO strategy managers
#[derive(Clone)]
pub struct MacoManagerDriver {
    client: ChainClient,
    coordinator: RebalancingCoordinator,
}

impl MacoManagerDriver {
    pub fn new(client: ChainClient, addresses: ProtocolAddresses) -> Self {
        let coordinator = RebalancingCoordinator::new(client.clone(), addresses);
        Self {
            client,
            coordinator,
        }
    }

    /// Read the manager, its rebalancing Set and both price feeds
    pub async fn fetch_details(&self, manager: Address) -> Result<MacoManagerDetails> {
        let record = self.client.maco_manager(manager).await?;
        let rb = record.rebalancing_set;

        let (
            (last_crossover_confirmation_timestamp, now),
            (current_set, rebalance_state, last_rebalance_timestamp, rebalance_interval),
            (price, moving_average),
        ) = tokio::try_join!(
            async {
                tokio::try_join!(
                    self.client.maco_last_crossover_confirmation_timestamp(manager),
                    self.client.latest_block_timestamp(),
                )
            },
            async {
                tokio::try_join!(
                    self.client.rebalancing_current_set(rb),
                    self.client.rebalancing_state(rb),
                    self.client.rebalancing_last_rebalance_timestamp(rb),
                    self.client.rebalancing_interval(rb),
                )
            },
            async {
                tokio::try_join!(
                    self.client.oracle_read(record.price_oracle),
                    self.client
                        .oracle_read_period(record.moving_average_oracle, record.moving_average_days),
                )
            },
        )?;

        Ok(MacoManagerDetails {
            manager,
            record,
            last_crossover_confirmation_timestamp,
            current_set,
            rebalance_state,
            last_rebalance_timestamp,
            rebalance_interval,
            price,
            moving_average,
            now,
        })
    }

    pub async fn can_initial_propose(&self, manager: Address) -> Result<bool> {
        let details = self.fetch_details(manager).await?;
        availability(check_initial_propose(&details).map(|_| ()))
    }

    /// Also false when the other collateral could not be proposed
    pub async fn can_confirm_propose(&self, manager: Address) -> Result<bool> {
        let details = self.fetch_details(manager).await?;
        let holding = match check_confirm_propose(&details) {
            Ok(holding) => holding,
            Err(e) => return availability(Err(e)),
        };
        let next_set = next_collateral(&details.record, holding);
        availability(
            self.coordinator
                .ensure_next_set_proposable(details.current_set, next_set)
                .await,
        )
    }

    /// Start the confirmation window; anyone may call
    pub async fn initial_propose(&self, manager: Address, caller: Address) -> Result<TxHash> {
        let details = self.fetch_details(manager).await?;
        let holding = check_initial_propose(&details)?;

        let tx_hash = self
            .client
            .send_transaction(
                ContractCall::ManagerInitialPropose { manager },
                TxOptions::new(caller),
            )
            .await?;

        tracing::info!(
            manager = ?manager,
            holding = ?holding,
            price = %details.price,
            moving_average = %details.moving_average,
            tx_hash = ?tx_hash,
            "MACO initial propose submitted"
        );
        Ok(tx_hash)
    }

    /// Confirm the crossover and have the manager propose the other collateral
    pub async fn confirm_propose(
        &self,
        manager: Address,
        caller: Address,
    ) -> Result<MacoConfirmation> {
        let details = self.fetch_details(manager).await?;
        let holding = check_confirm_propose(&details)?;
        let next_set = next_collateral(&details.record, holding);
        self.coordinator
            .ensure_next_set_proposable(details.current_set, next_set)
            .await?;
        let preview = self.preview_proposal(&details, holding).await?;

        let tx_hash = self
            .client
            .send_transaction(
                ContractCall::ManagerConfirmPropose { manager },
                TxOptions::new(caller),
            )
            .await?;

        tracing::info!(
            manager = ?manager,
            next_set = ?preview.next_set,
            auction_start_price = %preview.auction_start_price,
            auction_pivot_price = %preview.auction_pivot_price,
            tx_hash = ?tx_hash,
            "MACO proposal confirmed"
        );
        Ok(MacoConfirmation { tx_hash, preview })
    }

    /// Next set and auction prices the manager would propose from `holding`
    pub async fn preview_proposal(
        &self,
        details: &MacoManagerDetails,
        holding: Holding,
    ) -> Result<MacoProposalPreview> {
        let record = &details.record;
        let next_set = next_collateral(record, holding);

        let (current, next, price_divisor) = tokio::try_join!(
            fetch_set_details(&self.client, details.current_set),
            fetch_set_details(&self.client, next_set),
            async {
                self.client
                    .price_curve_divisor(record.auction_library)
                    .await
                    .map_err(Error::from)
            },
        )?;
        let current_set_value = self.set_dollar_value(&current, details).await?;
        let next_set_value = self.set_dollar_value(&next, details).await?;

        let (auction_start_price, auction_pivot_price) = calculate_auction_price_parameters(
            current_set_value,
            next_set_value,
            price_divisor,
            record.auction_start_percentage,
            record.auction_pivot_percentage,
        )?;

        Ok(MacoProposalPreview {
            next_set,
            current_set_value,
            next_set_value,
            auction_start_price,
            auction_pivot_price,
        })
    }

    /// Value a collateral Set: the risk asset at the oracle price, the stable
    /// asset at one dollar
    async fn set_dollar_value(
        &self,
        set: &SetTokenDetails,
        details: &MacoManagerDetails,
    ) -> Result<Quantity> {
        let mut prices = Vec::with_capacity(set.components.len());
        let mut decimals = Vec::with_capacity(set.components.len());
        for component in &set.components {
            let price = if *component == details.record.risk_asset {
                details.price
            } else if *component == details.record.stable_asset {
                ether(1)
            } else {
                return Err(ProtocolError::TokenNotInSet {
                    token: *component,
                    set: set.address,
                }
                .into());
            };
            prices.push(price);
            decimals.push(self.client.erc20_decimals(*component).await?);
        }
        calculate_set_dollar_value(&set.units, set.natural_unit, &prices, &decimals)
    }
}
