//! Configuration types for setkit
//!
//! Deployed contract addresses are optional: a missing or zero address means
//! the feature is not in use. Address strings are validated when the
//! configuration is built, and [`ProtocolAddresses::require`] fails with a
//! descriptive error the first time an unconfigured feature is invoked.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::ConfigError;
use crate::types::{parse_address, Address};

/// Gateway connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// JSON-RPC endpoint (e.g., "http://127.0.0.1:8545")
    pub rpc_url: String,

    /// Timeout applied to every read and submission, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Gas limit used when a caller does not supply one
    #[serde(default = "default_gas_limit")]
    pub default_gas_limit: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_gas_limit() -> u64 {
    6_000_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            request_timeout_secs: default_request_timeout_secs(),
            default_gas_limit: default_gas_limit(),
        }
    }
}

/// Names of the deployed contracts the library may address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKey {
    Core,
    TransferProxy,
    Vault,
    SetTokenFactory,
    RebalancingSetTokenFactory,
    ExchangeIssuanceModule,
    RebalanceAuctionModule,
    RebalancingSetExchangeIssuanceModule,
    RebalancingSetIssuanceModule,
    RebalancingSetEthBidder,
    WrappedEther,
    ProtocolViewer,
}

impl AddressKey {
    /// Configuration key as it appears in JSON
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "coreAddress",
            Self::TransferProxy => "transferProxyAddress",
            Self::Vault => "vaultAddress",
            Self::SetTokenFactory => "setTokenFactoryAddress",
            Self::RebalancingSetTokenFactory => "rebalancingSetTokenFactoryAddress",
            Self::ExchangeIssuanceModule => "exchangeIssuanceModuleAddress",
            Self::RebalanceAuctionModule => "rebalanceAuctionModuleAddress",
            Self::RebalancingSetExchangeIssuanceModule => "rebalancingSetExchangeIssuanceModule",
            Self::RebalancingSetIssuanceModule => "rebalancingSetIssuanceModule",
            Self::RebalancingSetEthBidder => "rebalancingSetEthBidderAddress",
            Self::WrappedEther => "wrappedEtherAddress",
            Self::ProtocolViewer => "protocolViewerAddress",
        }
    }
}

/// Deployed protocol contract addresses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolAddresses {
    #[serde(rename = "coreAddress", default, deserialize_with = "configured_address")]
    pub core: Option<Address>,

    #[serde(
        rename = "transferProxyAddress",
        default,
        deserialize_with = "configured_address"
    )]
    pub transfer_proxy: Option<Address>,

    #[serde(rename = "vaultAddress", default, deserialize_with = "configured_address")]
    pub vault: Option<Address>,

    #[serde(
        rename = "setTokenFactoryAddress",
        default,
        deserialize_with = "configured_address"
    )]
    pub set_token_factory: Option<Address>,

    #[serde(
        rename = "rebalancingSetTokenFactoryAddress",
        default,
        deserialize_with = "configured_address"
    )]
    pub rebalancing_set_token_factory: Option<Address>,

    #[serde(
        rename = "exchangeIssuanceModuleAddress",
        default,
        deserialize_with = "configured_address"
    )]
    pub exchange_issuance_module: Option<Address>,

    #[serde(
        rename = "rebalanceAuctionModuleAddress",
        default,
        deserialize_with = "configured_address"
    )]
    pub rebalance_auction_module: Option<Address>,

    #[serde(
        rename = "rebalancingSetExchangeIssuanceModule",
        default,
        deserialize_with = "configured_address"
    )]
    pub rebalancing_set_exchange_issuance_module: Option<Address>,

    #[serde(
        rename = "rebalancingSetIssuanceModule",
        default,
        deserialize_with = "configured_address"
    )]
    pub rebalancing_set_issuance_module: Option<Address>,

    #[serde(
        rename = "rebalancingSetEthBidderAddress",
        default,
        deserialize_with = "configured_address"
    )]
    pub rebalancing_set_eth_bidder: Option<Address>,

    #[serde(
        rename = "wrappedEtherAddress",
        default,
        deserialize_with = "configured_address"
    )]
    pub wrapped_ether: Option<Address>,

    #[serde(
        rename = "protocolViewerAddress",
        default,
        deserialize_with = "configured_address"
    )]
    pub protocol_viewer: Option<Address>,
}

/// Accepts a hex address string or null; the zero address means "not configured"
fn configured_address<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(value) => {
            let address = parse_address("protocol address", &value)
                .map_err(serde::de::Error::custom)?;
            Ok((!address.is_zero()).then_some(address))
        }
    }
}

impl ProtocolAddresses {
    /// Parse and validate addresses from JSON
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Address configured for `key`
    pub fn get(&self, key: AddressKey) -> Option<Address> {
        match key {
            AddressKey::Core => self.core,
            AddressKey::TransferProxy => self.transfer_proxy,
            AddressKey::Vault => self.vault,
            AddressKey::SetTokenFactory => self.set_token_factory,
            AddressKey::RebalancingSetTokenFactory => self.rebalancing_set_token_factory,
            AddressKey::ExchangeIssuanceModule => self.exchange_issuance_module,
            AddressKey::RebalanceAuctionModule => self.rebalance_auction_module,
            AddressKey::RebalancingSetExchangeIssuanceModule => {
                self.rebalancing_set_exchange_issuance_module
            }
            AddressKey::RebalancingSetIssuanceModule => self.rebalancing_set_issuance_module,
            AddressKey::RebalancingSetEthBidder => self.rebalancing_set_eth_bidder,
            AddressKey::WrappedEther => self.wrapped_ether,
            AddressKey::ProtocolViewer => self.protocol_viewer,
        }
    }

    /// Address configured for `key`, or `NotConfigured` naming the key
    pub fn require(&self, key: AddressKey) -> Result<Address, ConfigError> {
        self.get(key)
            .ok_or(ConfigError::NotConfigured { key: key.as_str() })
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetKitConfig {
    /// Gateway connection settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Deployed contract addresses
    #[serde(default)]
    pub addresses: ProtocolAddresses,
}

impl SetKitConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SetKitConfig::default();
        assert_eq!(config.gateway.rpc_url, "http://127.0.0.1:8545");
        assert_eq!(config.gateway.request_timeout_secs, 30);
        assert_eq!(config.addresses, ProtocolAddresses::default());
    }

    #[test]
    fn test_addresses_from_json() {
        let json = r#"{
            "coreAddress": "0x742d35Cc6634C0532925a3b844Bc9e7595f2bD08",
            "vaultAddress": "0x0000000000000000000000000000000000000000",
            "wrappedEtherAddress": null
        }"#;
        let addresses = ProtocolAddresses::from_json_str(json).unwrap();

        assert!(addresses.core.is_some());
        // Zero address is "not configured"
        assert_eq!(addresses.vault, None);
        assert_eq!(addresses.wrapped_ether, None);
        assert_eq!(addresses.transfer_proxy, None);
    }

    #[test]
    fn test_invalid_address_fails_at_construction() {
        let json = r#"{ "coreAddress": "0x1234" }"#;
        assert!(matches!(
            ProtocolAddresses::from_json_str(json),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_require_names_missing_key() {
        let addresses = ProtocolAddresses::default();
        let err = addresses.require(AddressKey::RebalanceAuctionModule).unwrap_err();
        assert_eq!(err.to_string(), "rebalanceAuctionModuleAddress is not configured");
    }

    #[test]
    fn test_config_serialization() {
        let mut config = SetKitConfig::default();
        config.addresses.core = Some(Address::repeat_byte(0x11));
        let json = serde_json::to_string(&config).unwrap();
        let parsed = SetKitConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed.addresses.core, config.addresses.core);
        assert_eq!(parsed.gateway.rpc_url, config.gateway.rpc_url);
    }
}
