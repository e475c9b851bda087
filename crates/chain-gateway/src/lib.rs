//! chain-gateway: Contract invocation boundary for setkit
//!
//! Defines the [`ContractGateway`] trait implemented by transport backends and
//! [`ChainClient`], the cloneable handle every higher layer receives. The
//! client applies the configured timeout to each call and logs submissions.

pub mod capabilities;
pub mod gateway;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use setkit_core::{Address, GatewayConfig, GatewayError, Quantity, RebalanceState, Timestamp, TxHash};

pub use capabilities::{probe_interface, Interface};
pub use gateway::{
    AssetPairManagerRecord, AuctionParameters, BiddingParameters, ContractCall, ContractGateway,
    ExchangeIssuanceParams, GatewayResult, MacoManagerRecord, TxOptions,
};

/// Handle to the ledger shared by all setkit components.
///
/// Constructed once by the entry point and passed down by reference or clone.
/// Cloning is cheap and shares the underlying gateway.
#[derive(Clone)]
pub struct ChainClient {
    inner: Arc<dyn ContractGateway>,
    config: GatewayConfig,
}

impl ChainClient {
    pub fn new(gateway: Arc<dyn ContractGateway>, config: GatewayConfig) -> Self {
        Self {
            inner: gateway,
            config,
        }
    }

    /// Get the current gateway configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs)
    }

    /// Wrap a gateway call with the configured timeout
    async fn timed<T>(&self, fut: impl Future<Output = GatewayResult<T>>) -> GatewayResult<T> {
        tokio::time::timeout(self.timeout(), fut)
            .await
            .map_err(|_| GatewayError::Timeout {
                secs: self.config.request_timeout_secs,
            })?
    }

    /// Fill in the configured default gas limit when the caller left it unset
    fn with_default_gas(&self, mut opts: TxOptions) -> TxOptions {
        if opts.gas.is_none() {
            opts.gas = Some(self.config.default_gas_limit);
        }
        opts
    }
}

#[async_trait]
impl ContractGateway for ChainClient {
    async fn erc20_balance_of(&self, token: Address, owner: Address) -> GatewayResult<Quantity> {
        self.timed(self.inner.erc20_balance_of(token, owner)).await
    }

    async fn erc20_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> GatewayResult<Quantity> {
        self.timed(self.inner.erc20_allowance(token, owner, spender))
            .await
    }

    async fn erc20_total_supply(&self, token: Address) -> GatewayResult<Quantity> {
        self.timed(self.inner.erc20_total_supply(token)).await
    }

    async fn erc20_decimals(&self, token: Address) -> GatewayResult<u8> {
        self.timed(self.inner.erc20_decimals(token)).await
    }

    async fn erc20_name(&self, token: Address) -> GatewayResult<String> {
        self.timed(self.inner.erc20_name(token)).await
    }

    async fn erc20_symbol(&self, token: Address) -> GatewayResult<String> {
        self.timed(self.inner.erc20_symbol(token)).await
    }

    async fn set_natural_unit(&self, set: Address) -> GatewayResult<Quantity> {
        self.timed(self.inner.set_natural_unit(set)).await
    }

    async fn set_components(&self, set: Address) -> GatewayResult<Vec<Address>> {
        self.timed(self.inner.set_components(set)).await
    }

    async fn set_units(&self, set: Address) -> GatewayResult<Vec<Quantity>> {
        self.timed(self.inner.set_units(set)).await
    }

    async fn core_valid_set(&self, core: Address, set: Address) -> GatewayResult<bool> {
        self.timed(self.inner.core_valid_set(core, set)).await
    }

    async fn core_transfer_proxy(&self, core: Address) -> GatewayResult<Address> {
        self.timed(self.inner.core_transfer_proxy(core)).await
    }

    async fn core_vault(&self, core: Address) -> GatewayResult<Address> {
        self.timed(self.inner.core_vault(core)).await
    }

    async fn vault_balance(
        &self,
        vault: Address,
        token: Address,
        owner: Address,
    ) -> GatewayResult<Quantity> {
        self.timed(self.inner.vault_balance(vault, token, owner))
            .await
    }

    async fn rebalancing_manager(&self, rebalancing_set: Address) -> GatewayResult<Address> {
        self.timed(self.inner.rebalancing_manager(rebalancing_set))
            .await
    }

    async fn rebalancing_current_set(&self, rebalancing_set: Address) -> GatewayResult<Address> {
        self.timed(self.inner.rebalancing_current_set(rebalancing_set))
            .await
    }

    async fn rebalancing_next_set(&self, rebalancing_set: Address) -> GatewayResult<Address> {
        self.timed(self.inner.rebalancing_next_set(rebalancing_set))
            .await
    }

    async fn rebalancing_state(&self, rebalancing_set: Address) -> GatewayResult<RebalanceState> {
        self.timed(self.inner.rebalancing_state(rebalancing_set))
            .await
    }

    async fn rebalancing_last_rebalance_timestamp(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Timestamp> {
        self.timed(self.inner.rebalancing_last_rebalance_timestamp(rebalancing_set))
            .await
    }

    async fn rebalancing_interval(&self, rebalancing_set: Address) -> GatewayResult<Timestamp> {
        self.timed(self.inner.rebalancing_interval(rebalancing_set))
            .await
    }

    async fn rebalancing_proposal_period(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Timestamp> {
        self.timed(self.inner.rebalancing_proposal_period(rebalancing_set))
            .await
    }

    async fn rebalancing_proposal_start_time(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Timestamp> {
        self.timed(self.inner.rebalancing_proposal_start_time(rebalancing_set))
            .await
    }

    async fn rebalancing_auction_library(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Address> {
        self.timed(self.inner.rebalancing_auction_library(rebalancing_set))
            .await
    }

    async fn rebalancing_auction_parameters(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<AuctionParameters> {
        self.timed(self.inner.rebalancing_auction_parameters(rebalancing_set))
            .await
    }

    async fn rebalancing_bidding_parameters(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<BiddingParameters> {
        self.timed(self.inner.rebalancing_bidding_parameters(rebalancing_set))
            .await
    }

    async fn rebalancing_combined_token_array(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Vec<Address>> {
        self.timed(self.inner.rebalancing_combined_token_array(rebalancing_set))
            .await
    }

    async fn rebalancing_combined_current_units(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Vec<Quantity>> {
        self.timed(self.inner.rebalancing_combined_current_units(rebalancing_set))
            .await
    }

    async fn rebalancing_combined_next_units(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Vec<Quantity>> {
        self.timed(self.inner.rebalancing_combined_next_units(rebalancing_set))
            .await
    }

    async fn rebalancing_unit_shares(&self, rebalancing_set: Address) -> GatewayResult<Quantity> {
        self.timed(self.inner.rebalancing_unit_shares(rebalancing_set))
            .await
    }

    async fn price_curve_divisor(&self, curve: Address) -> GatewayResult<Quantity> {
        self.timed(self.inner.price_curve_divisor(curve)).await
    }

    async fn oracle_read(&self, oracle: Address) -> GatewayResult<Quantity> {
        self.timed(self.inner.oracle_read(oracle)).await
    }

    async fn oracle_read_period(&self, oracle: Address, period: u64) -> GatewayResult<Quantity> {
        self.timed(self.inner.oracle_read_period(oracle, period))
            .await
    }

    async fn maco_manager(&self, manager: Address) -> GatewayResult<MacoManagerRecord> {
        self.timed(self.inner.maco_manager(manager)).await
    }

    async fn maco_last_crossover_confirmation_timestamp(
        &self,
        manager: Address,
    ) -> GatewayResult<Timestamp> {
        self.timed(self.inner.maco_last_crossover_confirmation_timestamp(manager))
            .await
    }

    async fn asset_pair_manager(&self, manager: Address) -> GatewayResult<AssetPairManagerRecord> {
        self.timed(self.inner.asset_pair_manager(manager)).await
    }

    async fn asset_pair_recent_initial_propose_timestamp(
        &self,
        manager: Address,
    ) -> GatewayResult<Timestamp> {
        self.timed(self.inner.asset_pair_recent_initial_propose_timestamp(manager))
            .await
    }

    async fn asset_pair_base_asset_allocation(
        &self,
        manager: Address,
    ) -> GatewayResult<Quantity> {
        self.timed(self.inner.asset_pair_base_asset_allocation(manager))
            .await
    }

    async fn latest_block_timestamp(&self) -> GatewayResult<Timestamp> {
        self.timed(self.inner.latest_block_timestamp()).await
    }

    async fn estimate_gas(&self, call: &ContractCall, opts: &TxOptions) -> GatewayResult<u64> {
        self.timed(self.inner.estimate_gas(call, opts)).await
    }

    async fn send_transaction(
        &self,
        call: ContractCall,
        opts: TxOptions,
    ) -> GatewayResult<TxHash> {
        let target = call.target();
        let method = call.method();
        let opts = self.with_default_gas(opts);

        match self.timed(self.inner.send_transaction(call, opts)).await {
            Ok(tx_hash) => {
                tracing::info!(%method, target = ?target, tx_hash = ?tx_hash, "Transaction submitted");
                Ok(tx_hash)
            }
            Err(e) => {
                tracing::warn!(%method, target = ?target, error = %e, "Transaction submission failed");
                Err(e)
            }
        }
    }
}
