//! Error types for setkit
//!
//! Every variant carries the concrete values involved (addresses, required vs.
//! actual quantities) so callers can render an actionable message without
//! re-deriving context.

use thiserror::Error;

use crate::types::{Address, Quantity, RebalanceState, Timestamp};

/// Core errors that can occur in setkit
#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Remote call error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.error_code(),
            Self::Gateway(e) => e.error_code(),
            Self::Protocol(e) => e.error_code(),
            Self::Strategy(e) => e.error_code(),
            Self::Config(_) => "config_error",
        }
    }
}

/// Malformed input, detected before any network call
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid address for {name}: {value}")]
    InvalidAddress { name: String, value: String },

    #[error("Invalid quantity for {name}: {reason}")]
    InvalidQuantity { name: String, reason: String },

    #[error("Array {name} must not be empty")]
    EmptyArray { name: String },

    #[error("Array length mismatch: {left} has {left_len} entries, {right} has {right_len}")]
    LengthMismatch {
        left: String,
        left_len: usize,
        right: String,
        right_len: usize,
    },

    #[error("Invalid decimal amount '{value}': {reason}")]
    InvalidUnits { value: String, reason: String },

    #[error("Arithmetic overflow in {operation}")]
    Overflow { operation: &'static str },

    #[error("Division by zero in {operation}")]
    DivisionByZero { operation: &'static str },
}

impl ValidationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAddress { .. } => "invalid_address",
            Self::InvalidQuantity { .. } => "invalid_quantity",
            Self::EmptyArray { .. } => "empty_array",
            Self::LengthMismatch { .. } => "length_mismatch",
            Self::InvalidUnits { .. } => "invalid_units",
            Self::Overflow { .. } => "arithmetic_overflow",
            Self::DivisionByZero { .. } => "division_by_zero",
        }
    }
}

/// Read or transaction submission failure at the gateway boundary.
///
/// The underlying cause is wrapped, never reinterpreted.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Call to {target:?} reverted: {reason}")]
    Reverted { target: Address, reason: String },

    #[error("Gateway request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Transport failure: {message}")]
    Transport { message: String },

    #[error("Failed to decode return value: {message}")]
    Decode { message: String },
}

impl GatewayError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Reverted { .. } => "call_reverted",
            Self::Timeout { .. } => "gateway_timeout",
            Self::Transport { .. } => "gateway_transport",
            Self::Decode { .. } => "gateway_decode",
        }
    }

    /// True when the contract answered but rejected or mis-shaped the call
    pub fn is_contract_failure(&self) -> bool {
        matches!(self, Self::Reverted { .. } | Self::Decode { .. })
    }
}

/// Protocol-level precondition failures
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Contract at {address:?} does not implement the {interface} interface")]
    MissingInterface {
        address: Address,
        interface: &'static str,
    },

    #[error("Insufficient balance of {token:?} for {owner:?}: need {required}, have {actual}")]
    InsufficientBalance {
        token: Address,
        owner: Address,
        required: Quantity,
        actual: Quantity,
    },

    #[error(
        "Insufficient allowance of {token:?} from {owner:?} to {spender:?}: need {required}, have {actual}"
    )]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        required: Quantity,
        actual: Quantity,
    },

    #[error("Quantity {quantity} is not a multiple of {unit_name} {unit}")]
    NonMultipleQuantity {
        quantity: Quantity,
        unit: Quantity,
        unit_name: &'static str,
    },

    #[error("Cannot {attempted} while rebalancing set is in {current} state")]
    InvalidStateTransition {
        current: RebalanceState,
        attempted: &'static str,
    },

    #[error("Rebalance interval not elapsed: last rebalance at {last}, interval {interval}s, now {now}")]
    RebalanceTooSoon {
        last: Timestamp,
        interval: Timestamp,
        now: Timestamp,
    },

    #[error("Proposal period not elapsed: proposal started at {started}, period {period}s, now {now}")]
    ProposalPeriodActive {
        started: Timestamp,
        period: Timestamp,
        now: Timestamp,
    },

    #[error("Auction has not expired: started at {started}, time to pivot {time_to_pivot}s, now {now}")]
    AuctionNotExpired {
        started: Timestamp,
        time_to_pivot: Timestamp,
        now: Timestamp,
    },

    #[error("Bid quantity {quantity} exceeds remaining current sets {remaining}")]
    BidTooLarge {
        quantity: Quantity,
        remaining: Quantity,
    },

    #[error("Rebalance cannot settle: {remaining} current sets remain (minimum bid {minimum_bid})")]
    BiddableRemainder {
        remaining: Quantity,
        minimum_bid: Quantity,
    },

    #[error("Caller {caller:?} is not the manager {manager:?} of {rebalancing_set:?}")]
    NotManager {
        caller: Address,
        manager: Address,
        rebalancing_set: Address,
    },

    #[error("Set {set:?} is not registered with core {core:?}")]
    InvalidSet { set: Address, core: Address },

    #[error("Natural units {current} and {next} are not multiples of one another")]
    IncompatibleNaturalUnits { current: Quantity, next: Quantity },

    #[error("Token {token:?} is not a component of set {set:?}")]
    TokenNotInSet { token: Address, set: Address },

    #[error("Expected {expected:?} for {name}, got {actual:?}")]
    AddressMismatch {
        name: &'static str,
        expected: Address,
        actual: Address,
    },

    #[error("Transaction value {provided} is below the required {required}")]
    InsufficientValue {
        required: Quantity,
        provided: Quantity,
    },
}

impl ProtocolError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingInterface { .. } => "missing_interface",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::InsufficientAllowance { .. } => "insufficient_allowance",
            Self::NonMultipleQuantity { .. } => "non_multiple_quantity",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::RebalanceTooSoon { .. } => "rebalance_too_soon",
            Self::ProposalPeriodActive { .. } => "proposal_period_active",
            Self::AuctionNotExpired { .. } => "auction_not_expired",
            Self::BidTooLarge { .. } => "bid_too_large",
            Self::BiddableRemainder { .. } => "biddable_remainder",
            Self::NotManager { .. } => "not_manager",
            Self::InvalidSet { .. } => "invalid_set",
            Self::IncompatibleNaturalUnits { .. } => "incompatible_natural_units",
            Self::TokenNotInSet { .. } => "token_not_in_set",
            Self::AddressMismatch { .. } => "address_mismatch",
            Self::InsufficientValue { .. } => "insufficient_value",
        }
    }
}

/// Strategy manager timing and signal precondition failures
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(
        "Confirmation window not satisfied: {elapsed}s since initial propose, window is [{min}s, {max}s]"
    )]
    ConfirmationWindow {
        elapsed: Timestamp,
        min: Timestamp,
        max: Timestamp,
    },

    #[error("Signal condition not met: expected {expected} (indicator {indicator}, reference {reference})")]
    CrossoverCondition {
        expected: &'static str,
        indicator: Quantity,
        reference: Quantity,
    },

    #[error("Initial propose already pending until {pending_until} (now {now})")]
    ProposalPending {
        pending_until: Timestamp,
        now: Timestamp,
    },

    #[error("RSI {rsi} is inside the neutral band [{lower}, {upper})")]
    NeutralSignal {
        rsi: Quantity,
        lower: Quantity,
        upper: Quantity,
    },

    #[error("Current set {current_set:?} is neither of the manager's collateral sets")]
    UnknownCollateral { current_set: Address },

    #[error("Base asset allocation is already {allocation}")]
    AllocationUnchanged { allocation: Quantity },
}

impl StrategyError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfirmationWindow { .. } => "confirmation_window",
            Self::CrossoverCondition { .. } => "crossover_condition",
            Self::ProposalPending { .. } => "proposal_pending",
            Self::NeutralSignal { .. } => "neutral_signal",
            Self::UnknownCollateral { .. } => "unknown_collateral",
            Self::AllocationUnchanged { .. } => "allocation_unchanged",
        }
    }
}

/// Configuration loading and lookup errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read configuration file {path}: {message}")]
    Io { path: String, message: String },

    #[error("{key} is not configured")]
    NotConfigured { key: &'static str },
}

/// Result type alias for setkit operations
pub type Result<T> = std::result::Result<T, Error>;
