//! Wallet balance and allowance checks

use chain_gateway::{ChainClient, ContractGateway};
use setkit_core::{Address, ProtocolError, Quantity, Result};

/// Fail unless `owner` holds at least `required` of `token`
pub async fn has_sufficient_balance(
    client: &ChainClient,
    token: Address,
    owner: Address,
    required: Quantity,
) -> Result<()> {
    let actual = client.erc20_balance_of(token, owner).await?;
    if actual < required {
        return Err(ProtocolError::InsufficientBalance {
            token,
            owner,
            required,
            actual,
        }
        .into());
    }
    Ok(())
}

/// Fail unless `owner` has approved `spender` for at least `required` of `token`
pub async fn has_sufficient_allowance(
    client: &ChainClient,
    token: Address,
    owner: Address,
    spender: Address,
    required: Quantity,
) -> Result<()> {
    let actual = client.erc20_allowance(token, owner, spender).await?;
    if actual < required {
        return Err(ProtocolError::InsufficientAllowance {
            token,
            owner,
            spender,
            required,
            actual,
        }
        .into());
    }
    Ok(())
}
