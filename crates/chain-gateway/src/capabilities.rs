//! Contract interface probing
//!
//! There is no client-side registry of valid contracts, so the only way to
//! tell whether an address is (say) a Set is to call one of its read methods.
//! The probe result is explicit: a revert or undecodable answer becomes
//! [`ProtocolError::MissingInterface`], while transport failures and timeouts
//! are surfaced as remote call errors because the contract was never asked.

use setkit_core::{Address, Error, GatewayError, ProtocolError};

use crate::ContractGateway;

/// Contract interfaces setkit can probe for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    Erc20,
    Set,
    RebalancingSet,
    Core,
}

impl Interface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Erc20 => "ERC20",
            Self::Set => "Set",
            Self::RebalancingSet => "RebalancingSet",
            Self::Core => "Core",
        }
    }
}

/// Check that `address` answers the read methods of `interface`
pub async fn probe_interface<G>(
    gateway: &G,
    address: Address,
    interface: Interface,
) -> Result<(), Error>
where
    G: ContractGateway + ?Sized,
{
    let outcome = match interface {
        Interface::Erc20 => gateway.erc20_total_supply(address).await.map(|_| ()),
        Interface::Set => gateway.set_natural_unit(address).await.map(|_| ()),
        Interface::RebalancingSet => {
            match gateway.set_natural_unit(address).await {
                Ok(_) => gateway.rebalancing_state(address).await.map(|_| ()),
                Err(e) => Err(e),
            }
        }
        Interface::Core => {
            match gateway.core_transfer_proxy(address).await {
                Ok(_) => gateway.core_vault(address).await.map(|_| ()),
                Err(e) => Err(e),
            }
        }
    };

    outcome.map_err(|e| classify_probe_failure(e, address, interface))
}

fn classify_probe_failure(error: GatewayError, address: Address, interface: Interface) -> Error {
    if error.is_contract_failure() {
        tracing::debug!(address = ?address, interface = interface.as_str(), error = %error, "Interface probe failed");
        ProtocolError::MissingInterface {
            address,
            interface: interface.as_str(),
        }
        .into()
    } else {
        error.into()
    }
}
