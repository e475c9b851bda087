//! The contract invocation boundary
//!
//! [`ContractGateway`] is the only way setkit touches the ledger. Reads decode
//! straight into setkit types; writes are expressed as a typed [`ContractCall`]
//! and return the transaction hash as soon as the transaction is submitted,
//! without waiting for it to be mined.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use setkit_core::{Address, GatewayError, Quantity, RebalanceState, Timestamp, TxHash};

/// Result type for gateway operations
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Auction curve parameters stored on a rebalancing Set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionParameters {
    pub auction_start_time: Timestamp,
    pub auction_time_to_pivot: Timestamp,
    pub auction_start_price: Quantity,
    pub auction_pivot_price: Quantity,
}

/// Bidding state of a rebalancing Set during an auction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiddingParameters {
    pub minimum_bid: Quantity,
    pub remaining_current_sets: Quantity,
    /// Current-set quantity at the start of the auction
    pub starting_current_sets: Quantity,
}

/// Immutable configuration of a moving-average crossover (MACO) manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacoManagerRecord {
    pub rebalancing_set: Address,
    /// Spot price feed for the risk asset
    pub price_oracle: Address,
    pub moving_average_oracle: Address,
    /// Moving average period in days
    pub moving_average_days: u64,
    pub risk_asset: Address,
    pub stable_asset: Address,
    /// Single-component Set holding the risk asset
    pub risk_collateral: Address,
    /// Single-component Set holding the stable asset
    pub stable_collateral: Address,
    pub auction_library: Address,
    pub auction_time_to_pivot: Timestamp,
    /// Percent below fair value the auction starts at
    pub auction_start_percentage: u64,
    /// Percent above fair value the auction pivots at
    pub auction_pivot_percentage: u64,
    pub crossover_confirmation_min_time: Timestamp,
    pub crossover_confirmation_max_time: Timestamp,
}

/// Immutable configuration of an asset-pair (RSI trigger) manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPairManagerRecord {
    pub rebalancing_set: Address,
    pub allocator: Address,
    /// RSI oracle backing the trigger
    pub trigger_oracle: Address,
    pub rsi_period: u64,
    /// RSI at or above this value is bullish
    pub rsi_upper_bound: Quantity,
    /// RSI below this value is bearish
    pub rsi_lower_bound: Quantity,
    pub allocation_precision: Quantity,
    pub bullish_base_asset_allocation: Quantity,
    pub auction_library: Address,
    pub auction_time_to_pivot: Timestamp,
    pub auction_start_percentage: u64,
    pub auction_pivot_percentage: u64,
    pub signal_confirmation_min_time: Timestamp,
    pub signal_confirmation_max_time: Timestamp,
}

/// Parameters of an exchange issuance (issue a Set by trading a payment token)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeIssuanceParams {
    pub set_address: Address,
    pub quantity: Quantity,
    pub send_token_exchange_ids: Vec<u8>,
    pub send_tokens: Vec<Address>,
    pub send_token_amounts: Vec<Quantity>,
    pub receive_tokens: Vec<Address>,
    pub receive_token_amounts: Vec<Quantity>,
}

/// State-changing contract methods setkit knows how to submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    Erc20Approve {
        token: Address,
        spender: Address,
        amount: Quantity,
    },
    Erc20Transfer {
        token: Address,
        to: Address,
        amount: Quantity,
    },
    CoreIssue {
        core: Address,
        set: Address,
        quantity: Quantity,
    },
    CoreRedeem {
        core: Address,
        set: Address,
        quantity: Quantity,
    },
    CoreRedeemAndWithdrawTo {
        core: Address,
        set: Address,
        to: Address,
        quantity: Quantity,
        /// Bitmask of component indexes left in the vault
        tokens_to_exclude: Quantity,
    },
    Propose {
        rebalancing_set: Address,
        next_set: Address,
        auction_library: Address,
        auction_time_to_pivot: Timestamp,
        auction_start_price: Quantity,
        auction_pivot_price: Quantity,
    },
    StartRebalance {
        rebalancing_set: Address,
    },
    SettleRebalance {
        rebalancing_set: Address,
    },
    EndFailedAuction {
        rebalancing_set: Address,
    },
    Bid {
        auction_module: Address,
        rebalancing_set: Address,
        quantity: Quantity,
        allow_partial_fill: bool,
    },
    BidWithEther {
        eth_bidder: Address,
        rebalancing_set: Address,
        quantity: Quantity,
        allow_partial_fill: bool,
    },
    RedeemFromFailedRebalance {
        auction_module: Address,
        rebalancing_set: Address,
    },
    ManagerInitialPropose {
        manager: Address,
    },
    ManagerConfirmPropose {
        manager: Address,
    },
    ExchangeIssue {
        module: Address,
        params: ExchangeIssuanceParams,
        orders: Vec<u8>,
    },
    IssueRebalancingSetWithEther {
        module: Address,
        rebalancing_set: Address,
        rebalancing_set_quantity: Quantity,
        params: ExchangeIssuanceParams,
        orders: Vec<u8>,
        keep_change_in_vault: bool,
    },
}

impl ContractCall {
    /// Contract the transaction is sent to
    pub fn target(&self) -> Address {
        match self {
            Self::Erc20Approve { token, .. } | Self::Erc20Transfer { token, .. } => *token,
            Self::CoreIssue { core, .. }
            | Self::CoreRedeem { core, .. }
            | Self::CoreRedeemAndWithdrawTo { core, .. } => *core,
            Self::Propose {
                rebalancing_set, ..
            }
            | Self::StartRebalance { rebalancing_set }
            | Self::SettleRebalance { rebalancing_set }
            | Self::EndFailedAuction { rebalancing_set } => *rebalancing_set,
            Self::Bid { auction_module, .. }
            | Self::RedeemFromFailedRebalance { auction_module, .. } => *auction_module,
            Self::BidWithEther { eth_bidder, .. } => *eth_bidder,
            Self::ManagerInitialPropose { manager } | Self::ManagerConfirmPropose { manager } => {
                *manager
            }
            Self::ExchangeIssue { module, .. }
            | Self::IssueRebalancingSetWithEther { module, .. } => *module,
        }
    }

    /// Solidity method name, for logs
    pub fn method(&self) -> &'static str {
        match self {
            Self::Erc20Approve { .. } => "approve",
            Self::Erc20Transfer { .. } => "transfer",
            Self::CoreIssue { .. } => "issue",
            Self::CoreRedeem { .. } => "redeem",
            Self::CoreRedeemAndWithdrawTo { .. } => "redeemAndWithdrawTo",
            Self::Propose { .. } => "propose",
            Self::StartRebalance { .. } => "startRebalance",
            Self::SettleRebalance { .. } => "settleRebalance",
            Self::EndFailedAuction { .. } => "endFailedAuction",
            Self::Bid { .. } => "bidAndWithdraw",
            Self::BidWithEther { .. } => "bidAndWithdrawWithEther",
            Self::RedeemFromFailedRebalance { .. } => "redeemFromFailedRebalance",
            Self::ManagerInitialPropose { .. } => "initialPropose",
            Self::ManagerConfirmPropose { .. } => "confirmPropose",
            Self::ExchangeIssue { .. } => "exchangeIssue",
            Self::IssueRebalancingSetWithEther { .. } => "issueRebalancingSetWithEther",
        }
    }
}

/// Sender-side transaction options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOptions {
    pub from: Address,
    #[serde(default)]
    pub gas: Option<u64>,
    #[serde(default)]
    pub gas_price: Option<Quantity>,
    /// Ether attached to the call
    #[serde(default)]
    pub value: Option<Quantity>,
}

impl TxOptions {
    pub fn new(sender: Address) -> Self {
        Self {
            from: sender,
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: Quantity) -> Self {
        self.value = Some(value);
        self
    }

    /// Attached value, zero when unset
    pub fn value_or_zero(&self) -> Quantity {
        self.value.unwrap_or_default()
    }
}

/// Typed access to deployed protocol contracts.
///
/// Implementations own ABI encoding, transport and signing. They must decode
/// return values deterministically and surface revert reasons as
/// [`GatewayError::Reverted`].
#[async_trait]
pub trait ContractGateway: Send + Sync {
    // ERC20

    async fn erc20_balance_of(&self, token: Address, owner: Address) -> GatewayResult<Quantity>;

    async fn erc20_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> GatewayResult<Quantity>;

    async fn erc20_total_supply(&self, token: Address) -> GatewayResult<Quantity>;

    async fn erc20_decimals(&self, token: Address) -> GatewayResult<u8>;

    async fn erc20_name(&self, token: Address) -> GatewayResult<String>;

    async fn erc20_symbol(&self, token: Address) -> GatewayResult<String>;

    // Set token

    async fn set_natural_unit(&self, set: Address) -> GatewayResult<Quantity>;

    async fn set_components(&self, set: Address) -> GatewayResult<Vec<Address>>;

    async fn set_units(&self, set: Address) -> GatewayResult<Vec<Quantity>>;

    // Core and vault

    async fn core_valid_set(&self, core: Address, set: Address) -> GatewayResult<bool>;

    async fn core_transfer_proxy(&self, core: Address) -> GatewayResult<Address>;

    async fn core_vault(&self, core: Address) -> GatewayResult<Address>;

    async fn vault_balance(
        &self,
        vault: Address,
        token: Address,
        owner: Address,
    ) -> GatewayResult<Quantity>;

    // Rebalancing Set token

    async fn rebalancing_manager(&self, rebalancing_set: Address) -> GatewayResult<Address>;

    async fn rebalancing_current_set(&self, rebalancing_set: Address) -> GatewayResult<Address>;

    async fn rebalancing_next_set(&self, rebalancing_set: Address) -> GatewayResult<Address>;

    async fn rebalancing_state(&self, rebalancing_set: Address) -> GatewayResult<RebalanceState>;

    async fn rebalancing_last_rebalance_timestamp(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Timestamp>;

    async fn rebalancing_interval(&self, rebalancing_set: Address) -> GatewayResult<Timestamp>;

    async fn rebalancing_proposal_period(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Timestamp>;

    async fn rebalancing_proposal_start_time(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Timestamp>;

    async fn rebalancing_auction_library(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Address>;

    async fn rebalancing_auction_parameters(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<AuctionParameters>;

    async fn rebalancing_bidding_parameters(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<BiddingParameters>;

    async fn rebalancing_combined_token_array(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Vec<Address>>;

    async fn rebalancing_combined_current_units(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Vec<Quantity>>;

    async fn rebalancing_combined_next_units(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Vec<Quantity>>;

    async fn rebalancing_unit_shares(&self, rebalancing_set: Address) -> GatewayResult<Quantity>;

    // Auction price curve

    async fn price_curve_divisor(&self, curve: Address) -> GatewayResult<Quantity>;

    // Oracles

    /// Spot price
    async fn oracle_read(&self, oracle: Address) -> GatewayResult<Quantity>;

    /// Moving average or RSI over `period` data points
    async fn oracle_read_period(&self, oracle: Address, period: u64) -> GatewayResult<Quantity>;

    // Strategy managers

    async fn maco_manager(&self, manager: Address) -> GatewayResult<MacoManagerRecord>;

    async fn maco_last_crossover_confirmation_timestamp(
        &self,
        manager: Address,
    ) -> GatewayResult<Timestamp>;

    async fn asset_pair_manager(&self, manager: Address) -> GatewayResult<AssetPairManagerRecord>;

    async fn asset_pair_recent_initial_propose_timestamp(
        &self,
        manager: Address,
    ) -> GatewayResult<Timestamp>;

    async fn asset_pair_base_asset_allocation(&self, manager: Address)
        -> GatewayResult<Quantity>;

    // Chain

    async fn latest_block_timestamp(&self) -> GatewayResult<Timestamp>;

    // Writes

    async fn estimate_gas(&self, call: &ContractCall, opts: &TxOptions) -> GatewayResult<u64>;

    async fn send_transaction(&self, call: ContractCall, opts: TxOptions)
        -> GatewayResult<TxHash>;
}
