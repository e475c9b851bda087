//! Bidding on rebalance auctions
//!
//! Pricing comes from the rebalancing coordinator. Bids check the bidder's
//! balances and approvals for every inflow token and then submit a single
//! transaction; a failed submission leaves no partial state behind.

use std::collections::HashMap;

use chain_gateway::{ChainClient, ContractCall, ContractGateway, TxOptions};
use rebalancing::{BidPrice, RebalancingCoordinator};
use serde::{Deserialize, Serialize};
use set_assertions::{has_sufficient_allowance, has_sufficient_balance};
use setkit_core::units::{mul_div_floor, scale};
use setkit_core::{
    Address, AddressKey, ProtocolAddresses, ProtocolError, Quantity, Result, TxHash,
    ValidationError,
};

/// Dollar valuation of a bid against caller-supplied token prices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidEvaluation {
    pub bid: BidPrice,
    /// Value the bidder supplies
    pub inflow_value: Quantity,
    /// Value the bidder receives
    pub outflow_value: Quantity,
}

impl BidEvaluation {
    pub fn is_profitable(&self) -> bool {
        self.outflow_value > self.inflow_value
    }

    /// Zero for unprofitable bids
    pub fn profit(&self) -> Quantity {
        self.outflow_value.saturating_sub(self.inflow_value)
    }
}

#[derive(Clone)]
pub struct BidderApi {
    client: ChainClient,
    addresses: ProtocolAddresses,
    coordinator: RebalancingCoordinator,
}

impl BidderApi {
    pub fn new(client: ChainClient, addresses: ProtocolAddresses) -> Self {
        let coordinator = RebalancingCoordinator::new(client.clone(), addresses.clone());
        Self {
            client,
            addresses,
            coordinator,
        }
    }

    /// Token flows for bidding `quantity` at the latest block timestamp
    pub async fn get_bid_price(
        &self,
        rebalancing_set: Address,
        quantity: Quantity,
        allow_partial_fill: bool,
    ) -> Result<BidPrice> {
        self.coordinator
            .bid_price(rebalancing_set, quantity, allow_partial_fill)
            .await
    }

    /// Bid paying every inflow token from `bidder`'s wallet
    pub async fn bid(
        &self,
        rebalancing_set: Address,
        quantity: Quantity,
        allow_partial_fill: bool,
        bidder: Address,
    ) -> Result<TxHash> {
        self.coordinator
            .bid(rebalancing_set, bidder, quantity, allow_partial_fill)
            .await
    }

    /// Bid through the ether bidder: the wrapped-ether inflow is paid by
    /// `value`, other inflow tokens must be approved to the ether bidder
    pub async fn bid_with_ether(
        &self,
        rebalancing_set: Address,
        quantity: Quantity,
        allow_partial_fill: bool,
        bidder: Address,
        value: Quantity,
    ) -> Result<TxHash> {
        let eth_bidder = self.addresses.require(AddressKey::RebalancingSetEthBidder)?;
        let wrapped_ether = self.addresses.require(AddressKey::WrappedEther)?;

        let bid = self
            .get_bid_price(rebalancing_set, quantity, allow_partial_fill)
            .await?;

        let mut ether_required = Quantity::zero();
        for (token, amount) in bid.required_inflows() {
            if token == wrapped_ether {
                ether_required = amount;
                continue;
            }
            has_sufficient_balance(&self.client, token, bidder, amount).await?;
            has_sufficient_allowance(&self.client, token, bidder, eth_bidder, amount).await?;
        }
        if value < ether_required {
            return Err(ProtocolError::InsufficientValue {
                required: ether_required,
                provided: value,
            }
            .into());
        }

        let call = ContractCall::BidWithEther {
            eth_bidder,
            rebalancing_set,
            quantity,
            allow_partial_fill,
        };
        let tx_hash = self
            .client
            .send_transaction(call, TxOptions::new(bidder).with_value(value))
            .await?;

        tracing::info!(
            rebalancing_set = ?rebalancing_set,
            quantity = %bid.quantity,
            value = %value,
            tx_hash = ?tx_hash,
            "Bid placed with ether"
        );
        Ok(tx_hash)
    }

    /// Value a bid's inflows and outflows with `prices` (1e18-scaled dollars
    /// per whole token)
    pub async fn evaluate_bid(
        &self,
        rebalancing_set: Address,
        quantity: Quantity,
        allow_partial_fill: bool,
        prices: &HashMap<Address, Quantity>,
    ) -> Result<BidEvaluation> {
        let bid = self
            .get_bid_price(rebalancing_set, quantity, allow_partial_fill)
            .await?;

        let mut inflow_value = Quantity::zero();
        let mut outflow_value = Quantity::zero();
        let flows = bid.flows.inflow.iter().zip(&bid.flows.outflow);
        for (token, (inflow, outflow)) in bid.tokens.iter().zip(flows) {
            let (inflow, outflow) = (*inflow, *outflow);
            if inflow.is_zero() && outflow.is_zero() {
                continue;
            }
            let price = prices.get(token).copied().ok_or_else(|| {
                ValidationError::InvalidQuantity {
                    name: "token price".to_string(),
                    reason: format!("no price supplied for {:?}", token),
                }
            })?;
            let unit = scale(self.client.erc20_decimals(*token).await? as u32);

            inflow_value = inflow_value
                .checked_add(mul_div_floor(inflow, price, unit, "inflow value")?)
                .ok_or(ValidationError::Overflow {
                    operation: "inflow value",
                })?;
            outflow_value = outflow_value
                .checked_add(mul_div_floor(outflow, price, unit, "outflow value")?)
                .ok_or(ValidationError::Overflow {
                    operation: "outflow value",
                })?;
        }

        tracing::debug!(
            rebalancing_set = ?rebalancing_set,
            quantity = %bid.quantity,
            inflow_value = %inflow_value,
            outflow_value = %outflow_value,
            "Evaluated bid"
        );

        Ok(BidEvaluation {
            bid,
            inflow_value,
            outflow_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_gateway::testing::{FakeLedger, RebalancingRecord};
    use rebalancing::ProposalParams;
    use setkit_core::constants::ONE_DAY;
    use setkit_core::units::ether;
    use setkit_core::{Error, RebalanceState};

    const RB: Address = Address::repeat_byte(0x77);
    const MANAGER: Address = Address::repeat_byte(0x4d);
    const HOLDER: Address = Address::repeat_byte(0x48);
    const BIDDER: Address = Address::repeat_byte(0xb0);
    const CORE: Address = Address::repeat_byte(0xc0);
    const PROXY: Address = Address::repeat_byte(0x0f);
    const VAULT: Address = Address::repeat_byte(0x0e);
    const AUCTION_MODULE: Address = Address::repeat_byte(0xa0);
    const ETH_BIDDER: Address = Address::repeat_byte(0xa2);
    const CURVE: Address = Address::repeat_byte(0xcc);
    const CURRENT_SET: Address = Address::repeat_byte(0x51);
    const NEXT_SET: Address = Address::repeat_byte(0x52);
    const A: Address = Address::repeat_byte(0xa1);
    const WETH: Address = Address::repeat_byte(0xee);

    fn q(n: u64) -> Quantity {
        Quantity::from(n)
    }

    fn addresses() -> ProtocolAddresses {
        ProtocolAddresses {
            core: Some(CORE),
            transfer_proxy: Some(PROXY),
            vault: Some(VAULT),
            rebalance_auction_module: Some(AUCTION_MODULE),
            rebalancing_set_eth_bidder: Some(ETH_BIDDER),
            wrapped_ether: Some(WETH),
            ..ProtocolAddresses::default()
        }
    }

    /// Auction from 100 A per 10 into 100 WETH per 10, flat price 1000/1000,
    /// four minimum bids of 10_000 outstanding
    async fn setup() -> (FakeLedger, BidderApi) {
        let ledger = FakeLedger::new();
        ledger.set_time(10 * ONE_DAY);
        ledger.add_core(CORE, PROXY, VAULT);
        ledger.add_token(A, "A", 18);
        ledger.add_token(WETH, "WETH", 18);
        ledger.add_set(CURRENT_SET, vec![A], vec![q(100)], q(10));
        ledger.add_set(NEXT_SET, vec![WETH], vec![q(100)], q(10));
        ledger.register_set(CORE, NEXT_SET);
        ledger.add_price_curve(CURVE, q(1000));

        let mut record = RebalancingRecord::new(MANAGER, CURRENT_SET, q(10));
        record.natural_unit = q(10);
        ledger.add_rebalancing_set(RB, record);
        ledger.mint(RB, HOLDER, q(40_000));

        let coordinator = RebalancingCoordinator::new(ledger.client(), addresses());
        let proposal = ProposalParams {
            next_set: NEXT_SET,
            auction_library: CURVE,
            auction_time_to_pivot: ONE_DAY,
            auction_start_price: q(1000),
            auction_pivot_price: q(1000),
        };
        coordinator.propose(RB, MANAGER, &proposal).await.unwrap();
        ledger.advance(ONE_DAY);
        coordinator.start_rebalance(RB, MANAGER).await.unwrap();

        let api = BidderApi::new(ledger.client(), addresses());
        (ledger, api)
    }

    #[tokio::test]
    async fn test_get_bid_price() {
        let (_ledger, api) = setup().await;

        let bid = api.get_bid_price(RB, q(10_000), false).await.unwrap();
        assert_eq!(bid.tokens, vec![A, WETH]);
        assert_eq!(bid.flows.inflow, vec![q(0), q(100_000)]);
        assert_eq!(bid.flows.outflow, vec![q(100_000), q(0)]);
    }

    #[tokio::test]
    async fn test_bid_from_wallet() {
        let (ledger, api) = setup().await;
        ledger.mint(WETH, BIDDER, q(100_000));
        ledger.set_allowance(WETH, BIDDER, PROXY, q(100_000));

        api.bid(RB, q(10_000), false, BIDDER).await.unwrap();
        assert_eq!(
            ledger.rebalancing(RB).unwrap().bidding.remaining_current_sets,
            q(30_000)
        );
    }

    #[tokio::test]
    async fn test_bid_with_ether_needs_enough_value() {
        let (ledger, api) = setup().await;

        let err = api
            .bid_with_ether(RB, q(10_000), false, BIDDER, q(99_999))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::InsufficientValue { required, .. }) if required == q(100_000)
        ));
        assert!(ledger.submitted().iter().all(|(call, _)| call.target() != ETH_BIDDER));

        api.bid_with_ether(RB, q(10_000), false, BIDDER, q(100_000))
            .await
            .unwrap();
        let (call, opts) = ledger.submitted().pop().unwrap();
        assert_eq!(call.target(), ETH_BIDDER);
        assert_eq!(opts.value, Some(q(100_000)));
        assert_eq!(
            ledger.rebalancing(RB).unwrap().bidding.remaining_current_sets,
            q(30_000)
        );
    }

    #[tokio::test]
    async fn test_bid_with_ether_outside_auction() {
        let (ledger, api) = setup().await;
        ledger.update_rebalancing(RB, |r| r.state = RebalanceState::Default);

        let err = api
            .bid_with_ether(RB, q(10_000), false, BIDDER, q(100_000))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_state_transition");
    }

    #[tokio::test]
    async fn test_evaluate_bid() {
        let (_ledger, api) = setup().await;
        let prices = HashMap::from([(A, ether(2)), (WETH, ether(1))]);

        let evaluation = api.evaluate_bid(RB, q(10_000), false, &prices).await.unwrap();
        // 100_000 A at $2 out, 100_000 WETH at $1 in (base units, 18 decimals)
        assert_eq!(evaluation.outflow_value, q(200_000));
        assert_eq!(evaluation.inflow_value, q(100_000));
        assert!(evaluation.is_profitable());
        assert_eq!(evaluation.profit(), q(100_000));

        let partial = HashMap::from([(A, ether(2))]);
        let err = api.evaluate_bid(RB, q(10_000), false, &partial).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_quantity");
    }

    #[tokio::test]
    async fn test_evaluate_bid_rejects_misaligned_combined_arrays() {
        let (ledger, api) = setup().await;
        ledger.update_rebalancing(RB, |r| {
            r.combined_token_array.push(Address::repeat_byte(0x99))
        });
        let prices = HashMap::from([(A, ether(2)), (WETH, ether(1))]);

        let err = api.evaluate_bid(RB, q(10_000), false, &prices).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::LengthMismatch { left_len: 3, right_len: 2, .. })
        ));

        ledger.mint(WETH, BIDDER, q(100_000));
        ledger.set_allowance(WETH, BIDDER, PROXY, q(100_000));
        let err = api.bid(RB, q(10_000), false, BIDDER).await.unwrap_err();
        assert_eq!(err.error_code(), "length_mismatch");
        assert!(ledger.submitted().iter().all(|(call, _)| call.target() != AUCTION_MODULE));
    }
}
