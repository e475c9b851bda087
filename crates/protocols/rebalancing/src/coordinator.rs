//! Rebalancing lifecycle coordinator
//!
//! Client-side model of the allowed transitions:
//!
//! ```text
//! Default -> Proposal -> Rebalance -> Default   (settled)
//!                                  -> Drawdown  (auction failed)
//! ```
//!
//! Every operation re-reads the on-chain state it depends on, checks its
//! guards and then submits exactly one transaction. The coordinator never
//! advances state on the caller's behalf; a guard failure is returned as is.

use chain_gateway::{ChainClient, ContractCall, ContractGateway, TxOptions};
use set_assertions::{
    auction_expired, has_sufficient_allowance, has_sufficient_balance, implements_set,
    is_in_default_state, is_in_state, is_manager, is_positive_quantity, is_valid_set,
    natural_units_compatible, rebalance_interval_elapsed, sufficient_time_in_proposal,
};
use setkit_core::{
    Address, AddressKey, Error, ProtocolAddresses, ProtocolError, Quantity, RebalanceState,
    Result, TxHash,
};

use crate::calculator::{
    compute_auction_price, compute_combined_arrays, compute_failed_redemption_shares,
    compute_next_set_issue_quantity, compute_token_flows, compute_unit_shares, execution_quantity,
};
use crate::fetch::{
    fetch_rebalance_details, fetch_rebalancing_set_details, fetch_set_details,
    fetch_vault_balances,
};
use crate::state::{BidPrice, ProposalParams, SettlementPreview, StartedRebalance};

/// Fail with `InvalidStateTransition` unless `current == expected`
pub(crate) fn ensure_state(
    current: RebalanceState,
    expected: RebalanceState,
    attempted: &'static str,
) -> Result<()> {
    if current != expected {
        return Err(ProtocolError::InvalidStateTransition { current, attempted }.into());
    }
    Ok(())
}

/// Drives a rebalancing Set through its lifecycle
#[derive(Clone)]
pub struct RebalancingCoordinator {
    client: ChainClient,
    addresses: ProtocolAddresses,
}

impl RebalancingCoordinator {
    pub fn new(client: ChainClient, addresses: ProtocolAddresses) -> Self {
        Self { client, addresses }
    }

    pub fn client(&self) -> &ChainClient {
        &self.client
    }

    /// Propose `params.next_set` as the next collateral. Only the manager may
    /// propose, from `Default`, once the rebalance interval has elapsed.
    pub async fn propose(
        &self,
        rebalancing_set: Address,
        caller: Address,
        params: &ProposalParams,
    ) -> Result<TxHash> {
        self.addresses.require(AddressKey::Core)?;
        let details = fetch_rebalancing_set_details(&self.client, rebalancing_set).await?;
        let now = self.client.latest_block_timestamp().await?;

        ensure_state(details.state, RebalanceState::Default, "propose")?;
        rebalance_interval_elapsed(
            details.last_rebalance_timestamp,
            details.rebalance_interval,
            now,
        )?;
        if details.manager != caller {
            return Err(ProtocolError::NotManager {
                caller,
                manager: details.manager,
                rebalancing_set,
            }
            .into());
        }

        self.ensure_next_set_proposable(details.current_set, params.next_set)
            .await?;

        let call = ContractCall::Propose {
            rebalancing_set,
            next_set: params.next_set,
            auction_library: params.auction_library,
            auction_time_to_pivot: params.auction_time_to_pivot,
            auction_start_price: params.auction_start_price,
            auction_pivot_price: params.auction_pivot_price,
        };
        let tx_hash = self
            .client
            .send_transaction(call, TxOptions::new(caller))
            .await?;

        tracing::info!(
            rebalancing_set = ?rebalancing_set,
            next_set = ?params.next_set,
            tx_hash = ?tx_hash,
            "Rebalance proposed"
        );
        Ok(tx_hash)
    }

    /// Move a proposal into the auction once the proposal period has elapsed.
    ///
    /// Returns the combined arrays the contract is expected to commit.
    pub async fn start_rebalance(
        &self,
        rebalancing_set: Address,
        caller: Address,
    ) -> Result<StartedRebalance> {
        let now = self.client.latest_block_timestamp().await?;
        is_in_state(
            &self.client,
            rebalancing_set,
            RebalanceState::Proposal,
            "startRebalance",
        )
        .await?;
        sufficient_time_in_proposal(&self.client, rebalancing_set, now).await?;

        let (current_set, next_set, auction_library) = tokio::try_join!(
            self.client.rebalancing_current_set(rebalancing_set),
            self.client.rebalancing_next_set(rebalancing_set),
            self.client.rebalancing_auction_library(rebalancing_set),
        )?;
        let (current, next, price_divisor) = tokio::try_join!(
            fetch_set_details(&self.client, current_set),
            fetch_set_details(&self.client, next_set),
            async { self.client.price_curve_divisor(auction_library).await.map_err(Error::from) },
        )?;

        let expected = compute_combined_arrays(
            (&current.components, &current.units, current.natural_unit),
            (&next.components, &next.units, next.natural_unit),
            price_divisor,
        )?;
        tracing::debug!(
            rebalancing_set = ?rebalancing_set,
            tokens = expected.combined_token_array.len(),
            minimum_bid = %expected.minimum_bid,
            "Computed combined arrays"
        );

        let tx_hash = self
            .client
            .send_transaction(
                ContractCall::StartRebalance { rebalancing_set },
                TxOptions::new(caller),
            )
            .await?;

        tracing::info!(rebalancing_set = ?rebalancing_set, tx_hash = ?tx_hash, "Rebalance auction started");
        Ok(StartedRebalance { tx_hash, expected })
    }

    /// Price a bid at the latest block timestamp
    pub async fn bid_price(
        &self,
        rebalancing_set: Address,
        quantity: Quantity,
        allow_partial_fill: bool,
    ) -> Result<BidPrice> {
        is_positive_quantity("bid quantity", quantity)?;
        is_in_state(&self.client, rebalancing_set, RebalanceState::Rebalance, "bid").await?;
        let (details, now) = tokio::try_join!(
            fetch_rebalance_details(&self.client, rebalancing_set),
            async { self.client.latest_block_timestamp().await.map_err(Error::from) },
        )?;

        let executed = execution_quantity(
            quantity,
            details.bidding.remaining_current_sets,
            details.bidding.minimum_bid,
            allow_partial_fill,
        )?;
        let price = compute_auction_price(
            details.auction.auction_start_time,
            now,
            details.auction.auction_time_to_pivot,
            details.auction.auction_start_price,
            details.auction.auction_pivot_price,
            details.price_divisor,
        )?;
        let flows = compute_token_flows(
            &details.combined_current_units,
            &details.combined_next_units,
            executed,
            price,
            details.bidding.minimum_bid,
        )?;

        tracing::debug!(
            rebalancing_set = ?rebalancing_set,
            quantity = %executed,
            numerator = %price.numerator,
            denominator = %price.denominator,
            "Priced bid"
        );

        Ok(BidPrice {
            quantity: executed,
            timestamp: now,
            price,
            tokens: details.combined_token_array,
            flows,
        })
    }

    /// Bid `quantity` current sets, supplying the inflow tokens from `bidder`'s
    /// wallet through the transfer proxy
    pub async fn bid(
        &self,
        rebalancing_set: Address,
        bidder: Address,
        quantity: Quantity,
        allow_partial_fill: bool,
    ) -> Result<TxHash> {
        let auction_module = self.addresses.require(AddressKey::RebalanceAuctionModule)?;
        let transfer_proxy = self.addresses.require(AddressKey::TransferProxy)?;

        let bid = self
            .bid_price(rebalancing_set, quantity, allow_partial_fill)
            .await?;
        for (token, amount) in bid.required_inflows() {
            has_sufficient_balance(&self.client, token, bidder, amount).await?;
            has_sufficient_allowance(&self.client, token, bidder, transfer_proxy, amount).await?;
        }

        let call = ContractCall::Bid {
            auction_module,
            rebalancing_set,
            quantity,
            allow_partial_fill,
        };
        let tx_hash = self
            .client
            .send_transaction(call, TxOptions::new(bidder))
            .await?;

        tracing::info!(
            rebalancing_set = ?rebalancing_set,
            quantity = %bid.quantity,
            tx_hash = ?tx_hash,
            "Bid placed"
        );
        Ok(tx_hash)
    }

    /// Settle an auction once less than one minimum bid of current sets remains
    pub async fn settle_rebalance(&self, rebalancing_set: Address, caller: Address) -> Result<TxHash> {
        is_in_state(
            &self.client,
            rebalancing_set,
            RebalanceState::Rebalance,
            "settleRebalance",
        )
        .await?;
        let bidding = self.client.rebalancing_bidding_parameters(rebalancing_set).await?;

        let remaining = bidding.remaining_current_sets;
        let minimum_bid = bidding.minimum_bid;
        if remaining >= minimum_bid {
            return Err(ProtocolError::BiddableRemainder {
                remaining,
                minimum_bid,
            }
            .into());
        }

        let tx_hash = self
            .client
            .send_transaction(
                ContractCall::SettleRebalance { rebalancing_set },
                TxOptions::new(caller),
            )
            .await?;

        tracing::info!(rebalancing_set = ?rebalancing_set, tx_hash = ?tx_hash, "Rebalance settled");
        Ok(tx_hash)
    }

    /// Next-set issue quantity and unit shares settlement would produce
    pub async fn preview_settlement(&self, rebalancing_set: Address) -> Result<SettlementPreview> {
        let vault = self.addresses.require(AddressKey::Vault)?;
        let (details, next_set) = tokio::try_join!(
            fetch_rebalancing_set_details(&self.client, rebalancing_set),
            async {
                self.client
                    .rebalancing_next_set(rebalancing_set)
                    .await
                    .map_err(Error::from)
            },
        )?;
        let next = fetch_set_details(&self.client, next_set).await?;
        let balances =
            fetch_vault_balances(&self.client, vault, &next.components, rebalancing_set).await?;

        let next_set_issue_quantity =
            compute_next_set_issue_quantity(&balances, &next.units, next.natural_unit)?;
        let unit_shares = compute_unit_shares(
            next_set_issue_quantity,
            details.natural_unit,
            details.total_supply,
        )?;

        Ok(SettlementPreview {
            next_set_issue_quantity,
            unit_shares,
        })
    }

    /// End an auction that ran past its pivot time without completing.
    ///
    /// The Set enters `Drawdown` if any bid was filled, otherwise it returns
    /// to `Default`.
    pub async fn end_failed_auction(&self, rebalancing_set: Address, caller: Address) -> Result<TxHash> {
        let now = self.client.latest_block_timestamp().await?;
        is_in_state(
            &self.client,
            rebalancing_set,
            RebalanceState::Rebalance,
            "endFailedAuction",
        )
        .await?;
        auction_expired(&self.client, rebalancing_set, now).await?;

        let bidding = self.client.rebalancing_bidding_parameters(rebalancing_set).await?;
        let outcome = if bidding.remaining_current_sets == bidding.starting_current_sets {
            RebalanceState::Default
        } else {
            RebalanceState::Drawdown
        };

        let tx_hash = self
            .client
            .send_transaction(
                ContractCall::EndFailedAuction { rebalancing_set },
                TxOptions::new(caller),
            )
            .await?;

        tracing::warn!(
            rebalancing_set = ?rebalancing_set,
            remaining = %bidding.remaining_current_sets,
            outcome = %outcome,
            tx_hash = ?tx_hash,
            "Failed auction ended"
        );
        Ok(tx_hash)
    }

    /// Burn `caller`'s balance of a Set in `Drawdown` for its pro-rata collateral
    pub async fn redeem_from_failed_rebalance(
        &self,
        rebalancing_set: Address,
        caller: Address,
    ) -> Result<TxHash> {
        let auction_module = self.addresses.require(AddressKey::RebalanceAuctionModule)?;
        is_in_state(
            &self.client,
            rebalancing_set,
            RebalanceState::Drawdown,
            "redeemFromFailedRebalance",
        )
        .await?;
        let balance = self.client.erc20_balance_of(rebalancing_set, caller).await?;
        if balance.is_zero() {
            return Err(ProtocolError::InsufficientBalance {
                token: rebalancing_set,
                owner: caller,
                required: Quantity::one(),
                actual: balance,
            }
            .into());
        }

        let tx_hash = self
            .client
            .send_transaction(
                ContractCall::RedeemFromFailedRebalance {
                    auction_module,
                    rebalancing_set,
                },
                TxOptions::new(caller),
            )
            .await?;

        tracing::info!(
            rebalancing_set = ?rebalancing_set,
            balance = %balance,
            tx_hash = ?tx_hash,
            "Redeemed from failed rebalance"
        );
        Ok(tx_hash)
    }

    /// Collateral `holder` would receive from a failed rebalance, per token
    pub async fn preview_failed_redemption(
        &self,
        rebalancing_set: Address,
        holder: Address,
    ) -> Result<Vec<(Address, Quantity)>> {
        let vault = self.addresses.require(AddressKey::Vault)?;
        let (tokens, holder_balance, total_supply) = tokio::try_join!(
            self.client.rebalancing_combined_token_array(rebalancing_set),
            self.client.erc20_balance_of(rebalancing_set, holder),
            self.client.erc20_total_supply(rebalancing_set),
        )?;
        let balances = fetch_vault_balances(&self.client, vault, &tokens, rebalancing_set).await?;
        let shares = compute_failed_redemption_shares(holder_balance, total_supply, &balances)?;

        Ok(tokens.into_iter().zip(shares).collect())
    }

    /// `next_set` must be a Set registered with Core whose natural unit is a
    /// multiple or a divisor of the current set's
    pub async fn ensure_next_set_proposable(
        &self,
        current_set: Address,
        next_set: Address,
    ) -> Result<()> {
        let core = self.addresses.require(AddressKey::Core)?;
        implements_set(&self.client, next_set).await?;
        is_valid_set(&self.client, core, next_set).await?;
        let (current_unit, next_unit) = tokio::try_join!(
            self.client.set_natural_unit(current_set),
            self.client.set_natural_unit(next_set),
        )?;
        natural_units_compatible(current_unit, next_unit)
    }

    /// Check that `caller` manages `rebalancing_set` and it is idle
    pub async fn ensure_manager_can_propose(
        &self,
        rebalancing_set: Address,
        caller: Address,
    ) -> Result<()> {
        is_in_default_state(&self.client, rebalancing_set, "propose").await?;
        is_manager(&self.client, rebalancing_set, caller).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_gateway::testing::{FakeLedger, RebalancingRecord};
    use setkit_core::constants::ONE_DAY;

    const RB: Address = Address::repeat_byte(0x77);
    const MANAGER: Address = Address::repeat_byte(0x4d);
    const HOLDER: Address = Address::repeat_byte(0x48);
    const BIDDER: Address = Address::repeat_byte(0xb0);
    const CORE: Address = Address::repeat_byte(0xc0);
    const PROXY: Address = Address::repeat_byte(0x0f);
    const VAULT: Address = Address::repeat_byte(0x0e);
    const AUCTION_MODULE: Address = Address::repeat_byte(0xa0);
    const CURVE: Address = Address::repeat_byte(0xcc);
    const CURRENT_SET: Address = Address::repeat_byte(0x51);
    const NEXT_SET: Address = Address::repeat_byte(0x52);
    const A: Address = Address::repeat_byte(0xa1);
    const B: Address = Address::repeat_byte(0xb1);

    fn q(n: u64) -> Quantity {
        Quantity::from(n)
    }

    fn addresses() -> ProtocolAddresses {
        ProtocolAddresses {
            core: Some(CORE),
            transfer_proxy: Some(PROXY),
            vault: Some(VAULT),
            rebalance_auction_module: Some(AUCTION_MODULE),
            ..ProtocolAddresses::default()
        }
    }

    fn proposal() -> ProposalParams {
        ProposalParams {
            next_set: NEXT_SET,
            auction_library: CURVE,
            auction_time_to_pivot: ONE_DAY,
            auction_start_price: q(1000),
            auction_pivot_price: q(1000),
        }
    }

    /// Rebalancing set holding CURRENT_SET (100 A per 10) with 4 minimum bids of
    /// current sets outstanding, and NEXT_SET (100 B per 10) registered
    fn setup() -> (FakeLedger, RebalancingCoordinator) {
        let ledger = FakeLedger::new();
        ledger.set_time(10 * ONE_DAY);
        ledger.add_core(CORE, PROXY, VAULT);
        ledger.add_set(CURRENT_SET, vec![A], vec![q(100)], q(10));
        ledger.add_set(NEXT_SET, vec![B], vec![q(100)], q(10));
        ledger.register_set(CORE, NEXT_SET);
        ledger.add_price_curve(CURVE, q(1000));

        let mut record = RebalancingRecord::new(MANAGER, CURRENT_SET, q(10));
        record.natural_unit = q(10);
        ledger.add_rebalancing_set(RB, record);
        ledger.mint(RB, HOLDER, q(40_000));

        let coordinator = RebalancingCoordinator::new(ledger.client(), addresses());
        (ledger, coordinator)
    }

    async fn into_auction(ledger: &FakeLedger, coordinator: &RebalancingCoordinator) {
        coordinator.propose(RB, MANAGER, &proposal()).await.unwrap();
        ledger.advance(ONE_DAY);
        coordinator.start_rebalance(RB, MANAGER).await.unwrap();
    }

    fn fund_bidder(ledger: &FakeLedger, amount: Quantity) {
        ledger.mint(B, BIDDER, amount);
        ledger.set_allowance(B, BIDDER, PROXY, amount);
    }

    #[tokio::test]
    async fn test_propose_guards() {
        let (ledger, coordinator) = setup();

        let err = coordinator
            .propose(RB, Address::repeat_byte(0x02), &proposal())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "not_manager");

        let mut unregistered = proposal();
        unregistered.next_set = CURRENT_SET;
        let err = coordinator
            .propose(RB, MANAGER, &unregistered)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_set");

        ledger.update_rebalancing(RB, |r| r.last_rebalance_timestamp = 10 * ONE_DAY - 1);
        let err = coordinator.propose(RB, MANAGER, &proposal()).await.unwrap_err();
        assert_eq!(err.error_code(), "rebalance_too_soon");
        assert!(ledger.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_propose_rejects_incompatible_natural_units() {
        let (ledger, coordinator) = setup();
        let odd = Address::repeat_byte(0x53);
        ledger.add_set(odd, vec![B], vec![q(100)], q(15));
        ledger.register_set(CORE, odd);

        let mut params = proposal();
        params.next_set = odd;
        let err = coordinator.propose(RB, MANAGER, &params).await.unwrap_err();
        assert_eq!(err.error_code(), "incompatible_natural_units");
    }

    #[tokio::test]
    async fn test_full_lifecycle_settles() {
        let (ledger, coordinator) = setup();

        coordinator.propose(RB, MANAGER, &proposal()).await.unwrap();
        assert_eq!(ledger.rebalancing(RB).unwrap().state, RebalanceState::Proposal);

        // Proposing again from Proposal is rejected client-side
        let err = coordinator.propose(RB, MANAGER, &proposal()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::InvalidStateTransition {
                current: RebalanceState::Proposal,
                attempted: "propose",
            })
        ));

        let err = coordinator.start_rebalance(RB, MANAGER).await.unwrap_err();
        assert_eq!(err.error_code(), "proposal_period_active");

        ledger.advance(ONE_DAY);
        let started = coordinator.start_rebalance(RB, MANAGER).await.unwrap();
        assert_eq!(started.expected.combined_token_array, vec![A, B]);
        assert_eq!(started.expected.combined_current_units, vec![q(100), q(0)]);
        assert_eq!(started.expected.combined_next_units, vec![q(0), q(100)]);
        assert_eq!(started.expected.minimum_bid, q(10_000));

        let record = ledger.rebalancing(RB).unwrap();
        assert_eq!(record.state, RebalanceState::Rebalance);
        assert_eq!(record.combined_token_array, started.expected.combined_token_array);
        assert_eq!(record.bidding.minimum_bid, started.expected.minimum_bid);
        assert_eq!(record.bidding.remaining_current_sets, q(40_000));

        // Settling with bids outstanding is rejected
        let err = coordinator.settle_rebalance(RB, MANAGER).await.unwrap_err();
        assert_eq!(err.error_code(), "biddable_remainder");

        let price = coordinator.bid_price(RB, q(10_000), false).await.unwrap();
        assert_eq!(price.flows.outflow, vec![q(100_000), q(0)]);
        assert_eq!(price.flows.inflow, vec![q(0), q(100_000)]);

        fund_bidder(&ledger, q(400_000));
        coordinator.bid(RB, BIDDER, q(10_000), false).await.unwrap();
        assert_eq!(
            ledger.rebalancing(RB).unwrap().bidding.remaining_current_sets,
            q(30_000)
        );

        let err = coordinator.bid(RB, BIDDER, q(40_000), false).await.unwrap_err();
        assert_eq!(err.error_code(), "bid_too_large");

        coordinator.bid(RB, BIDDER, q(40_000), true).await.unwrap();
        assert!(ledger
            .rebalancing(RB)
            .unwrap()
            .bidding
            .remaining_current_sets
            .is_zero());

        coordinator.settle_rebalance(RB, MANAGER).await.unwrap();
        let record = ledger.rebalancing(RB).unwrap();
        assert_eq!(record.state, RebalanceState::Default);
        assert_eq!(record.current_set, NEXT_SET);
    }

    #[tokio::test]
    async fn test_bid_requires_rebalance_state() {
        let (_ledger, coordinator) = setup();
        let err = coordinator.bid(RB, BIDDER, q(10_000), false).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::InvalidStateTransition {
                current: RebalanceState::Default,
                attempted: "bid",
            })
        ));
    }

    #[tokio::test]
    async fn test_bid_checks_inflow_balance_and_allowance() {
        let (ledger, coordinator) = setup();
        into_auction(&ledger, &coordinator).await;

        let err = coordinator.bid(RB, BIDDER, q(10_000), false).await.unwrap_err();
        assert_eq!(err.error_code(), "insufficient_balance");

        ledger.mint(B, BIDDER, q(100_000));
        let err = coordinator.bid(RB, BIDDER, q(10_000), false).await.unwrap_err();
        match err {
            Error::Protocol(ProtocolError::InsufficientAllowance {
                token,
                spender,
                required,
                ..
            }) => {
                assert_eq!(token, B);
                assert_eq!(spender, PROXY);
                assert_eq!(required, q(100_000));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = coordinator.bid(RB, BIDDER, q(15_000), false).await.unwrap_err();
        assert_eq!(err.error_code(), "non_multiple_quantity");
    }

    #[tokio::test]
    async fn test_full_bid_conserves_vault_collateral() {
        let (ledger, coordinator) = setup();
        into_auction(&ledger, &coordinator).await;

        let remaining = ledger.rebalancing(RB).unwrap().bidding.remaining_current_sets;
        let pre = [ledger.vault_of(A, RB), ledger.vault_of(B, RB)];
        assert_eq!(pre, [q(400_000), q(0)]);

        let price = coordinator.bid_price(RB, remaining, false).await.unwrap();
        assert_eq!(price.tokens, vec![A, B]);
        fund_bidder(&ledger, price.flows.inflow[1]);
        coordinator.bid(RB, BIDDER, remaining, false).await.unwrap();

        let post = [ledger.vault_of(A, RB), ledger.vault_of(B, RB)];
        for i in 0..2 {
            assert!(price.flows.inflow[i].is_zero() || price.flows.outflow[i].is_zero());
            assert_eq!(
                pre[i] + price.flows.inflow[i],
                post[i] + price.flows.outflow[i]
            );
        }
        assert_eq!(pre[0], post[0] + price.flows.outflow[0]);
        assert!(post[0].is_zero());
        assert_eq!(post[1], q(400_000));
    }

    #[tokio::test]
    async fn test_partial_fill_with_less_than_minimum_bid_left_is_not_submitted() {
        let (ledger, coordinator) = setup();
        into_auction(&ledger, &coordinator).await;
        ledger.update_rebalancing(RB, |r| r.bidding.remaining_current_sets = q(5_000));
        fund_bidder(&ledger, q(100_000));
        let submitted = ledger.submitted().len();

        let err = coordinator.bid(RB, BIDDER, q(10_000), true).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::BidTooLarge { remaining, .. }) if remaining == q(5_000)
        ));
        assert_eq!(ledger.submitted().len(), submitted);

        // What is left can only be settled
        coordinator.settle_rebalance(RB, MANAGER).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_auction_drawdown_and_redemption() {
        let (ledger, coordinator) = setup();
        into_auction(&ledger, &coordinator).await;

        fund_bidder(&ledger, q(100_000));
        coordinator.bid(RB, BIDDER, q(10_000), false).await.unwrap();

        let err = coordinator
            .redeem_from_failed_rebalance(RB, HOLDER)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_state_transition");

        let err = coordinator.end_failed_auction(RB, MANAGER).await.unwrap_err();
        assert_eq!(err.error_code(), "auction_not_expired");

        ledger.advance(ONE_DAY);
        coordinator.end_failed_auction(RB, MANAGER).await.unwrap();
        assert_eq!(ledger.rebalancing(RB).unwrap().state, RebalanceState::Drawdown);

        let preview = coordinator
            .preview_failed_redemption(RB, HOLDER)
            .await
            .unwrap();
        assert_eq!(preview, vec![(A, q(300_000)), (B, q(100_000))]);

        coordinator
            .redeem_from_failed_rebalance(RB, HOLDER)
            .await
            .unwrap();
        assert!(ledger.balance(RB, HOLDER).is_zero());

        let err = coordinator
            .redeem_from_failed_rebalance(RB, HOLDER)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "insufficient_balance");
    }

    #[tokio::test]
    async fn test_failed_auction_without_bids_returns_to_default() {
        let (ledger, coordinator) = setup();
        into_auction(&ledger, &coordinator).await;

        ledger.advance(ONE_DAY);
        coordinator.end_failed_auction(RB, MANAGER).await.unwrap();
        assert_eq!(ledger.rebalancing(RB).unwrap().state, RebalanceState::Default);
    }

    #[tokio::test]
    async fn test_preview_settlement() {
        let (ledger, coordinator) = setup();
        into_auction(&ledger, &coordinator).await;

        // 400_000 B in the vault backs 40_000 next sets at 100 B per 10
        ledger.deposit_vault(B, RB, q(400_000));
        let preview = coordinator.preview_settlement(RB).await.unwrap();
        assert_eq!(preview.next_set_issue_quantity, q(40_000));
        // 40_000 * 10 / 40_000 total supply
        assert_eq!(preview.unit_shares, q(10));
    }

    #[tokio::test]
    async fn test_unconfigured_module_fails_fast() {
        let ledger = FakeLedger::new();
        let coordinator = RebalancingCoordinator::new(ledger.client(), ProtocolAddresses::default());

        let err = coordinator.bid(RB, BIDDER, q(10), false).await.unwrap_err();
        assert!(err.to_string().contains("rebalanceAuctionModuleAddress"));
    }
}
