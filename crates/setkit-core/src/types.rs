//! Core type definitions for setkit

use std::fmt;

use serde::{Deserialize, Serialize};

pub use ethers_core::types::{Address, H256, U256};

use crate::errors::ValidationError;

/// Token amount scaled by 10^decimals. All arithmetic on it is exact integer math.
pub type Quantity = U256;

/// Transaction hash returned by the gateway on submission
pub type TxHash = H256;

/// Unix timestamp in seconds (block time)
pub type Timestamp = u64;

/// Lifecycle state of a rebalancing Set token, as encoded on-chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RebalanceState {
    Default,
    Proposal,
    Rebalance,
    Drawdown,
}

impl RebalanceState {
    /// Decode the contract's uint8 state enum
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Default),
            1 => Some(Self::Proposal),
            2 => Some(Self::Rebalance),
            3 => Some(Self::Drawdown),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Default => 0,
            Self::Proposal => 1,
            Self::Rebalance => 2,
            Self::Drawdown => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "Default",
            Self::Proposal => "Proposal",
            Self::Rebalance => "Rebalance",
            Self::Drawdown => "Drawdown",
        }
    }
}

impl fmt::Display for RebalanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static description of a Set (basket) token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTokenDetails {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub natural_unit: Quantity,
    /// Component addresses, parallel with `units`
    pub components: Vec<Address>,
    pub units: Vec<Quantity>,
}

impl SetTokenDetails {
    /// Position of a component in the Set, if present
    pub fn component_index(&self, token: &Address) -> Option<usize> {
        self.components.iter().position(|c| c == token)
    }
}

/// Parse a `0x`-prefixed, 20-byte hex address.
///
/// `name` identifies the argument in the returned error.
pub fn parse_address(name: &str, value: &str) -> Result<Address, ValidationError> {
    let invalid = || ValidationError::InvalidAddress {
        name: name.to_string(),
        value: value.to_string(),
    };

    let hex_part = value.strip_prefix("0x").ok_or_else(invalid)?;
    if hex_part.len() != 40 {
        return Err(invalid());
    }

    let bytes = hex::decode(hex_part).map_err(|_| invalid())?;
    Ok(Address::from_slice(&bytes))
}

/// Format an address as full lowercase hex (ethers' `Display` abbreviates)
pub fn address_hex(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

/// Time constants used by strategy managers and auction math
pub mod constants {
    use super::Timestamp;

    pub const ONE_MINUTE: Timestamp = 60;
    pub const ONE_HOUR: Timestamp = 60 * ONE_MINUTE;
    pub const ONE_DAY: Timestamp = 24 * ONE_HOUR;

    /// Decimals of a Set token (always 18)
    pub const SET_TOKEN_DECIMALS: u32 = 18;
}
