//! Strategy manager state and decision outputs

use chain_gateway::{AssetPairManagerRecord, MacoManagerRecord};
use serde::{Deserialize, Serialize};
use setkit_core::{Address, Quantity, RebalanceState, Timestamp, TxHash};

/// Which collateral a MACO-managed rebalancing Set currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Holding {
    RiskAsset,
    StableAsset,
}

impl Holding {
    /// Crossover needed to leave this holding, for error messages
    pub fn expected_crossover(&self) -> &'static str {
        match self {
            Self::RiskAsset => "price below moving average",
            Self::StableAsset => "price above moving average",
        }
    }
}

/// RSI trigger reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Signal {
    Bullish,
    Bearish,
}

/// Everything a MACO decision depends on, read at one block timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacoManagerDetails {
    pub manager: Address,
    pub record: MacoManagerRecord,
    pub last_crossover_confirmation_timestamp: Timestamp,
    pub current_set: Address,
    pub rebalance_state: RebalanceState,
    pub last_rebalance_timestamp: Timestamp,
    pub rebalance_interval: Timestamp,
    pub price: Quantity,
    pub moving_average: Quantity,
    pub now: Timestamp,
}

/// Everything an asset-pair decision depends on, read at one block timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPairManagerDetails {
    pub manager: Address,
    pub record: AssetPairManagerRecord,
    pub recent_initial_propose_timestamp: Timestamp,
    pub base_asset_allocation: Quantity,
    pub rebalance_state: RebalanceState,
    pub last_rebalance_timestamp: Timestamp,
    pub rebalance_interval: Timestamp,
    pub rsi: Quantity,
    pub now: Timestamp,
}

/// Next set and auction prices a MACO confirmation would propose
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacoProposalPreview {
    pub next_set: Address,
    pub current_set_value: Quantity,
    pub next_set_value: Quantity,
    pub auction_start_price: Quantity,
    pub auction_pivot_price: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacoConfirmation {
    pub tx_hash: TxHash,
    pub preview: MacoProposalPreview,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPairConfirmation {
    pub tx_hash: TxHash,
    pub signal: Signal,
    pub new_allocation: Quantity,
}
