//! Rebalancing Set state as read from the ledger, and derived auction values

use chain_gateway::{AuctionParameters, BiddingParameters};
use serde::{Deserialize, Serialize};
use setkit_core::{Address, Quantity, RebalanceState, Timestamp, TxHash};

/// Static and lifecycle fields of a rebalancing Set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalancingSetDetails {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub manager: Address,
    pub current_set: Address,
    pub state: RebalanceState,
    pub natural_unit: Quantity,
    pub unit_shares: Quantity,
    pub total_supply: Quantity,
    pub last_rebalance_timestamp: Timestamp,
    pub rebalance_interval: Timestamp,
    pub proposal_period: Timestamp,
}

/// Fields describing a pending proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDetails {
    pub state: RebalanceState,
    pub next_set: Address,
    pub auction_library: Address,
    pub proposal_start_time: Timestamp,
    pub auction: AuctionParameters,
}

/// Fields describing a running auction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceDetails {
    pub state: RebalanceState,
    pub auction: AuctionParameters,
    pub bidding: BiddingParameters,
    pub price_divisor: Quantity,
    pub combined_token_array: Vec<Address>,
    pub combined_current_units: Vec<Quantity>,
    pub combined_next_units: Vec<Quantity>,
}

/// Manager-selected parameters of a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalParams {
    pub next_set: Address,
    pub auction_library: Address,
    pub auction_time_to_pivot: Timestamp,
    pub auction_start_price: Quantity,
    pub auction_pivot_price: Quantity,
}

/// Auction price as a fraction; the denominator is the curve's price divisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionPrice {
    pub numerator: Quantity,
    pub denominator: Quantity,
}

/// Per-component amounts a bid moves, parallel with the combined token array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenFlows {
    /// Amounts the bidder supplies
    pub inflow: Vec<Quantity>,
    /// Amounts the bidder receives
    pub outflow: Vec<Quantity>,
}

/// Combined arrays and minimum bid committed by `startRebalance`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedArrays {
    pub combined_token_array: Vec<Address>,
    pub combined_current_units: Vec<Quantity>,
    pub combined_next_units: Vec<Quantity>,
    pub minimum_bid: Quantity,
}

/// Priced bid at a given block timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidPrice {
    /// Quantity that would execute (clamped when partial fill is allowed)
    pub quantity: Quantity,
    pub timestamp: Timestamp,
    pub price: AuctionPrice,
    pub tokens: Vec<Address>,
    pub flows: TokenFlows,
}

impl BidPrice {
    /// Tokens with a non-zero inflow and the amount the bidder must supply
    pub fn required_inflows(&self) -> impl Iterator<Item = (Address, Quantity)> + '_ {
        self.tokens
            .iter()
            .zip(&self.flows.inflow)
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(token, amount)| (*token, *amount))
    }

    pub fn outflows(&self) -> impl Iterator<Item = (Address, Quantity)> + '_ {
        self.tokens
            .iter()
            .zip(&self.flows.outflow)
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(token, amount)| (*token, *amount))
    }
}

/// Result of submitting `startRebalance`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedRebalance {
    pub tx_hash: TxHash,
    /// Arrays the contract is expected to commit
    pub expected: CombinedArrays,
}

/// Settlement preview for a rebalance that can settle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementPreview {
    pub next_set_issue_quantity: Quantity,
    pub unit_shares: Quantity,
}
