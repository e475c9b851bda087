//! setkit: Client library for Set tokens
//!
//! [`SetKit`] owns the one [`ChainClient`] of a process, built from a
//! [`ContractGateway`] backend and a [`SetKitConfig`], and hands out the
//! higher-level APIs that share it:
//!
//! - [`RebalancingCoordinator`]: propose, auction, bid, settle, drawdown
//! - [`MacoManagerDriver`] / [`AssetPairManagerDriver`]: two-phase proposals
//! - [`IssuanceApi`], [`ExchangeIssuanceApi`], [`BidderApi`]: caller facades
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use setkit::{SetKit, SetKitConfig};
//!
//! setkit::logging::init(None)?;
//! let config = SetKitConfig::from_file("setkit.json")?;
//! let kit = SetKit::new(Arc::new(my_gateway), config);
//!
//! if kit.maco_manager().can_confirm_propose(manager).await? {
//!     kit.maco_manager().confirm_propose(manager, keeper).await?;
//! }
//! ```

pub mod logging;

use std::sync::Arc;

pub use chain_gateway::{
    probe_interface, ChainClient, ContractCall, ContractGateway, Interface, TxOptions,
};
pub use issuance::{BidderApi, ExchangeIssuanceApi, IssuanceApi};
pub use managers::{AssetPairManagerDriver, MacoManagerDriver};
pub use rebalancing::RebalancingCoordinator;
pub use set_assertions as assertions;
pub use setkit_core::{
    Address, Error, ProtocolAddresses, Quantity, RebalanceState, Result, SetKitConfig,
    Timestamp, TxHash,
};

/// Entry point holding the shared gateway handle and configuration
#[derive(Clone)]
pub struct SetKit {
    client: ChainClient,
    config: SetKitConfig,
}

impl SetKit {
    pub fn new(gateway: Arc<dyn ContractGateway>, config: SetKitConfig) -> Self {
        let client = ChainClient::new(gateway, config.gateway.clone());
        tracing::debug!(
            rpc_url = %config.gateway.rpc_url,
            timeout_secs = config.gateway.request_timeout_secs,
            "setkit client created"
        );
        Self { client, config }
    }

    pub fn client(&self) -> &ChainClient {
        &self.client
    }

    pub fn config(&self) -> &SetKitConfig {
        &self.config
    }

    pub fn addresses(&self) -> &ProtocolAddresses {
        &self.config.addresses
    }

    pub fn rebalancing(&self) -> RebalancingCoordinator {
        RebalancingCoordinator::new(self.client.clone(), self.config.addresses.clone())
    }

    pub fn maco_manager(&self) -> MacoManagerDriver {
        MacoManagerDriver::new(self.client.clone(), self.config.addresses.clone())
    }

    pub fn asset_pair_manager(&self) -> AssetPairManagerDriver {
        AssetPairManagerDriver::new(self.client.clone())
    }

    pub fn issuance(&self) -> IssuanceApi {
        IssuanceApi::new(self.client.clone(), self.config.addresses.clone())
    }

    pub fn exchange_issuance(&self) -> ExchangeIssuanceApi {
        ExchangeIssuanceApi::new(self.client.clone(), self.config.addresses.clone())
    }

    pub fn bidder(&self) -> BidderApi {
        BidderApi::new(self.client.clone(), self.config.addresses.clone())
    }

    /// Check that `address` implements `interface` before handing it to an API
    pub async fn probe(&self, address: Address, interface: Interface) -> Result<()> {
        probe_interface(&self.client, address, interface).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_gateway::testing::{FakeLedger, RebalancingRecord};
    use chain_gateway::MacoManagerRecord;
    use setkit_core::constants::{ONE_DAY, ONE_HOUR};
    use setkit_core::units::ether;

    const CORE: Address = Address::repeat_byte(0xc0);
    const PROXY: Address = Address::repeat_byte(0x0f);
    const VAULT: Address = Address::repeat_byte(0x0e);
    const AUCTION_MODULE: Address = Address::repeat_byte(0xa0);
    const MANAGER: Address = Address::repeat_byte(0x4d);
    const RB: Address = Address::repeat_byte(0x77);
    const WETH: Address = Address::repeat_byte(0xe1);
    const USDC: Address = Address::repeat_byte(0xd1);
    const RISK_SET: Address = Address::repeat_byte(0x51);
    const STABLE_SET: Address = Address::repeat_byte(0x52);
    const PRICE_FEED: Address = Address::repeat_byte(0xf1);
    const MA_FEED: Address = Address::repeat_byte(0xf2);
    const CURVE: Address = Address::repeat_byte(0xcc);
    const HOLDER: Address = Address::repeat_byte(0x48);
    const KEEPER: Address = Address::repeat_byte(0x0b);
    const BIDDER: Address = Address::repeat_byte(0xb0);

    const T0: u64 = 10 * ONE_DAY;

    fn q(n: u64) -> Quantity {
        Quantity::from(n)
    }

    fn config() -> SetKitConfig {
        let mut config = SetKitConfig::default();
        config.addresses = ProtocolAddresses {
            core: Some(CORE),
            transfer_proxy: Some(PROXY),
            vault: Some(VAULT),
            rebalance_auction_module: Some(AUCTION_MODULE),
            ..ProtocolAddresses::default()
        };
        config
    }

    /// A MACO-managed rebalancing Set holding 4e15 base units of the risk
    /// collateral, with the price below its moving average
    fn setup() -> (FakeLedger, SetKit) {
        let ledger = FakeLedger::new();
        ledger.set_time(T0);
        ledger.add_core(CORE, PROXY, VAULT);
        ledger.add_token(WETH, "WETH", 18);
        ledger.add_token(USDC, "USDC", 6);
        ledger.add_set(RISK_SET, vec![WETH], vec![q(1_000_000)], q(1_000_000));
        ledger.add_set(STABLE_SET, vec![USDC], vec![q(200)], q(1_000_000_000_000));
        ledger.register_set(CORE, RISK_SET);
        ledger.register_set(CORE, STABLE_SET);
        ledger.add_price_curve(CURVE, q(1000));
        ledger.set_oracle_price(PRICE_FEED, ether(190));
        ledger.set_oracle_period_value(MA_FEED, 20, ether(200));

        ledger.add_rebalancing_set(
            RB,
            RebalancingRecord::new(MANAGER, RISK_SET, q(1_000_000)),
        );
        ledger.mint(RB, HOLDER, ether(40));
        ledger.add_maco_manager(
            MANAGER,
            MacoManagerRecord {
                rebalancing_set: RB,
                price_oracle: PRICE_FEED,
                moving_average_oracle: MA_FEED,
                moving_average_days: 20,
                risk_asset: WETH,
                stable_asset: USDC,
                risk_collateral: RISK_SET,
                stable_collateral: STABLE_SET,
                auction_library: CURVE,
                auction_time_to_pivot: ONE_DAY,
                auction_start_percentage: 5,
                auction_pivot_percentage: 10,
                crossover_confirmation_min_time: 6 * ONE_HOUR,
                crossover_confirmation_max_time: 12 * ONE_HOUR,
            },
        );

        let kit = SetKit::new(Arc::new(ledger.clone()), config());
        (ledger, kit)
    }

    #[tokio::test]
    async fn test_crossover_to_settlement() {
        let (ledger, kit) = setup();
        let manager = kit.maco_manager();
        let coordinator = kit.rebalancing();

        manager.initial_propose(MANAGER, KEEPER).await.unwrap();
        ledger.set_time(T0 + 6 * ONE_HOUR);
        manager.confirm_propose(MANAGER, KEEPER).await.unwrap();
        assert_eq!(ledger.rebalancing(RB).unwrap().state, RebalanceState::Proposal);

        let err = coordinator.start_rebalance(RB, KEEPER).await.unwrap_err();
        assert_eq!(err.error_code(), "proposal_period_active");

        ledger.advance(ONE_DAY);
        let started = coordinator.start_rebalance(RB, KEEPER).await.unwrap();
        assert_eq!(started.expected.combined_token_array, vec![WETH, USDC]);
        // max natural unit 1e12 times the curve divisor
        let minimum_bid = started.expected.minimum_bid;
        assert_eq!(minimum_bid, q(1_000_000_000_000_000));

        let bid = kit.bidder().get_bid_price(RB, minimum_bid, false).await.unwrap();
        assert_eq!(bid.flows.outflow, vec![minimum_bid, q(0)]);
        assert_eq!(bid.flows.inflow, vec![q(0), q(200)]);

        ledger.mint(USDC, BIDDER, q(800));
        ledger.set_allowance(USDC, BIDDER, PROXY, q(800));
        kit.bidder()
            .bid(RB, minimum_bid * q(4), false, BIDDER)
            .await
            .unwrap();

        coordinator.settle_rebalance(RB, KEEPER).await.unwrap();
        let record = ledger.rebalancing(RB).unwrap();
        assert_eq!(record.state, RebalanceState::Default);
        assert_eq!(record.current_set, STABLE_SET);
    }

    #[tokio::test]
    async fn test_facades_share_one_client() {
        let (ledger, kit) = setup();
        ledger.fail_reads("node offline");

        let err = kit.bidder().get_bid_price(RB, q(1), false).await.unwrap_err();
        assert_eq!(err.error_code(), "gateway_transport");
        let err = kit.asset_pair_manager().fetch_details(MANAGER).await.unwrap_err();
        assert_eq!(err.error_code(), "gateway_transport");
    }

    #[tokio::test]
    async fn test_probe() {
        let (_ledger, kit) = setup();
        assert!(kit.probe(RB, Interface::RebalancingSet).await.is_ok());

        let err = kit.probe(WETH, Interface::Set).await.unwrap_err();
        assert_eq!(err.error_code(), "missing_interface");
    }

    #[test]
    fn test_default_config_leaves_addresses_unset() {
        let kit = SetKit::new(Arc::new(FakeLedger::new()), SetKitConfig::default());
        assert_eq!(kit.addresses().core, None);
        assert_eq!(kit.config().gateway.request_timeout_secs, 30);
    }
}
