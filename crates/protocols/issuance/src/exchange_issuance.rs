//! Exchange issuance: issue a Set by trading payment tokens for its components
//!
//! The module executes the trade orders and issues in one transaction. Both
//! operations below check their parameters read-only first and submit once,
//! so a failure leaves nothing to unwind.

use chain_gateway::{
    ChainClient, ContractCall, ContractGateway, ExchangeIssuanceParams, TxOptions,
};
use serde::{Deserialize, Serialize};
use set_assertions::{
    has_sufficient_allowance, has_sufficient_balance, implements_rebalancing_set,
    is_multiple_of_natural_unit, is_not_empty_array, is_positive_quantity, is_valid_set,
    receive_tokens_are_components, same_length,
};
use setkit_core::units::mul_div_floor;
use setkit_core::{
    Address, AddressKey, ProtocolAddresses, ProtocolError, Quantity, Result, TxHash,
    ValidationError,
};

/// Issue `quantity` rebalancing Sets paying in ether
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtherIssuance {
    pub rebalancing_set: Address,
    pub quantity: Quantity,
    /// Exchange issuance of the base Set the rebalancing Set wraps
    pub params: ExchangeIssuanceParams,
    /// Encoded exchange orders
    pub orders: Vec<u8>,
    pub keep_change_in_vault: bool,
}

/// Shape and registry checks shared by both flows
async fn validate_params(
    client: &ChainClient,
    core: Address,
    params: &ExchangeIssuanceParams,
) -> Result<()> {
    is_positive_quantity("issue quantity", params.quantity)?;
    is_valid_set(client, core, params.set_address).await?;
    is_multiple_of_natural_unit(client, params.set_address, params.quantity).await?;

    is_not_empty_array("sendTokens", &params.send_tokens)?;
    same_length(
        "sendTokenExchangeIds",
        &params.send_token_exchange_ids,
        "sendTokens",
        &params.send_tokens,
    )?;
    same_length(
        "sendTokens",
        &params.send_tokens,
        "sendTokenAmounts",
        &params.send_token_amounts,
    )?;
    for amount in &params.send_token_amounts {
        is_positive_quantity("send token amount", *amount)?;
    }

    is_not_empty_array("receiveTokens", &params.receive_tokens)?;
    same_length(
        "receiveTokens",
        &params.receive_tokens,
        "receiveTokenAmounts",
        &params.receive_token_amounts,
    )?;
    for amount in &params.receive_token_amounts {
        is_positive_quantity("receive token amount", *amount)?;
    }
    receive_tokens_are_components(client, params.set_address, &params.receive_tokens).await
}

#[derive(Clone)]
pub struct ExchangeIssuanceApi {
    client: ChainClient,
    addresses: ProtocolAddresses,
}

impl ExchangeIssuanceApi {
    pub fn new(client: ChainClient, addresses: ProtocolAddresses) -> Self {
        Self { client, addresses }
    }

    /// Issue `params.set_address` by trading `caller`'s send tokens
    pub async fn exchange_issue(
        &self,
        params: ExchangeIssuanceParams,
        orders: Vec<u8>,
        caller: Address,
    ) -> Result<TxHash> {
        let core = self.addresses.require(AddressKey::Core)?;
        let module = self.addresses.require(AddressKey::ExchangeIssuanceModule)?;
        let transfer_proxy = self.addresses.require(AddressKey::TransferProxy)?;

        validate_params(&self.client, core, &params).await?;
        for (token, amount) in params.send_tokens.iter().zip(&params.send_token_amounts) {
            has_sufficient_balance(&self.client, *token, caller, *amount).await?;
            has_sufficient_allowance(&self.client, *token, caller, transfer_proxy, *amount)
                .await?;
        }

        let set = params.set_address;
        let quantity = params.quantity;
        let tx_hash = self
            .client
            .send_transaction(
                ContractCall::ExchangeIssue {
                    module,
                    params,
                    orders,
                },
                TxOptions::new(caller),
            )
            .await?;

        tracing::info!(set = ?set, quantity = %quantity, tx_hash = ?tx_hash, "Exchange issuance submitted");
        Ok(tx_hash)
    }

    /// Issue a rebalancing Set from ether attached as `value`
    ///
    /// The base Set issued by the trade must cover `quantity` rebalancing
    /// Sets at the current unit shares, and every send token must be wrapped
    /// ether.
    pub async fn issue_rebalancing_set_with_ether(
        &self,
        request: EtherIssuance,
        caller: Address,
        value: Quantity,
    ) -> Result<TxHash> {
        let core = self.addresses.require(AddressKey::Core)?;
        let module = self
            .addresses
            .require(AddressKey::RebalancingSetExchangeIssuanceModule)?;
        let wrapped_ether = self.addresses.require(AddressKey::WrappedEther)?;
        let rebalancing_set = request.rebalancing_set;

        is_positive_quantity("rebalancing set quantity", request.quantity)?;
        implements_rebalancing_set(&self.client, rebalancing_set).await?;
        is_multiple_of_natural_unit(&self.client, rebalancing_set, request.quantity).await?;

        let (base_set, unit_shares, natural_unit) = tokio::try_join!(
            self.client.rebalancing_current_set(rebalancing_set),
            self.client.rebalancing_unit_shares(rebalancing_set),
            self.client.set_natural_unit(rebalancing_set),
        )?;
        if request.params.set_address != base_set {
            return Err(ProtocolError::AddressMismatch {
                name: "base set",
                expected: base_set,
                actual: request.params.set_address,
            }
            .into());
        }
        validate_params(&self.client, core, &request.params).await?;

        if let Some(token) = request
            .params
            .send_tokens
            .iter()
            .find(|token| **token != wrapped_ether)
        {
            return Err(ProtocolError::AddressMismatch {
                name: "payment token",
                expected: wrapped_ether,
                actual: *token,
            }
            .into());
        }

        let required_base = mul_div_floor(
            request.quantity,
            unit_shares,
            natural_unit,
            "base set issue quantity",
        )?;
        if request.params.quantity < required_base {
            return Err(ValidationError::InvalidQuantity {
                name: "base set issue quantity".to_string(),
                reason: format!(
                    "{} is below the {} needed for {} rebalancing sets",
                    request.params.quantity, required_base, request.quantity
                ),
            }
            .into());
        }

        let required_value = request
            .params
            .send_token_amounts
            .iter()
            .try_fold(Quantity::zero(), |total, amount| total.checked_add(*amount))
            .ok_or(ValidationError::Overflow {
                operation: "payment total",
            })?;
        if value < required_value {
            return Err(ProtocolError::InsufficientValue {
                required: required_value,
                provided: value,
            }
            .into());
        }

        tracing::debug!(
            rebalancing_set = ?rebalancing_set,
            base_set = ?base_set,
            required_base = %required_base,
            value = %value,
            "Ether issuance checks passed"
        );

        let tx_hash = self
            .client
            .send_transaction(
                ContractCall::IssueRebalancingSetWithEther {
                    module,
                    rebalancing_set,
                    rebalancing_set_quantity: request.quantity,
                    params: request.params,
                    orders: request.orders,
                    keep_change_in_vault: request.keep_change_in_vault,
                },
                TxOptions::new(caller).with_value(value),
            )
            .await?;

        tracing::info!(
            rebalancing_set = ?rebalancing_set,
            quantity = %request.quantity,
            tx_hash = ?tx_hash,
            "Rebalancing set issued with ether"
        );
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_gateway::testing::{FakeLedger, RebalancingRecord};
    use setkit_core::Error;

    const CORE: Address = Address::repeat_byte(0xc0);
    const PROXY: Address = Address::repeat_byte(0x0f);
    const VAULT: Address = Address::repeat_byte(0x0e);
    const EXCHANGE_MODULE: Address = Address::repeat_byte(0xe0);
    const RB_MODULE: Address = Address::repeat_byte(0xe2);
    const WETH: Address = Address::repeat_byte(0xee);
    const SET: Address = Address::repeat_byte(0x51);
    const RB: Address = Address::repeat_byte(0x77);
    const A: Address = Address::repeat_byte(0xa1);
    const BUYER: Address = Address::repeat_byte(0x01);

    fn q(n: u64) -> Quantity {
        Quantity::from(n)
    }

    fn addresses() -> ProtocolAddresses {
        ProtocolAddresses {
            core: Some(CORE),
            transfer_proxy: Some(PROXY),
            vault: Some(VAULT),
            exchange_issuance_module: Some(EXCHANGE_MODULE),
            rebalancing_set_exchange_issuance_module: Some(RB_MODULE),
            wrapped_ether: Some(WETH),
            ..ProtocolAddresses::default()
        }
    }

    /// SET holds 1 A per natural unit of 2; RB wraps 4 SET per 1e10 RB
    fn setup() -> (FakeLedger, ExchangeIssuanceApi) {
        let ledger = FakeLedger::new();
        ledger.add_core(CORE, PROXY, VAULT);
        ledger.add_token(WETH, "WETH", 18);
        ledger.add_set(SET, vec![A], vec![q(1)], q(2));
        ledger.register_set(CORE, SET);
        ledger.add_rebalancing_set(RB, RebalancingRecord::new(Address::zero(), SET, q(4)));
        ledger.mint(WETH, BUYER, q(1000));
        ledger.set_allowance(WETH, BUYER, PROXY, q(1000));
        let api = ExchangeIssuanceApi::new(ledger.client(), addresses());
        (ledger, api)
    }

    fn params(quantity: u64) -> ExchangeIssuanceParams {
        ExchangeIssuanceParams {
            set_address: SET,
            quantity: q(quantity),
            send_token_exchange_ids: vec![1],
            send_tokens: vec![WETH],
            send_token_amounts: vec![q(500)],
            receive_tokens: vec![A],
            receive_token_amounts: vec![q(quantity / 2)],
        }
    }

    fn ether_request(rb_quantity: u64, base_quantity: u64) -> EtherIssuance {
        EtherIssuance {
            rebalancing_set: RB,
            quantity: Quantity::from(rb_quantity) * Quantity::exp10(10),
            params: params(base_quantity),
            orders: vec![0x01, 0x02],
            keep_change_in_vault: false,
        }
    }

    #[tokio::test]
    async fn test_exchange_issue() {
        let (ledger, api) = setup();

        api.exchange_issue(params(20), vec![0x01], BUYER).await.unwrap();
        assert_eq!(ledger.balance(SET, BUYER), q(20));

        let submitted = ledger.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].0.target(), EXCHANGE_MODULE);
    }

    #[tokio::test]
    async fn test_exchange_issue_parameter_checks() {
        let (ledger, api) = setup();

        let mut bad = params(20);
        bad.receive_tokens = vec![WETH];
        let err = api.exchange_issue(bad, vec![], BUYER).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::TokenNotInSet { token, set }) if token == WETH && set == SET
        ));

        let mut bad = params(20);
        bad.send_token_exchange_ids = vec![1, 2];
        let err = api.exchange_issue(bad, vec![], BUYER).await.unwrap_err();
        assert_eq!(err.error_code(), "length_mismatch");

        let mut bad = params(20);
        bad.send_token_amounts = vec![q(0)];
        let err = api.exchange_issue(bad, vec![], BUYER).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_quantity");

        let err = api.exchange_issue(params(21), vec![], BUYER).await.unwrap_err();
        assert_eq!(err.error_code(), "non_multiple_quantity");

        let mut bad = params(20);
        bad.send_token_amounts = vec![q(5000)];
        let err = api.exchange_issue(bad, vec![], BUYER).await.unwrap_err();
        assert_eq!(err.error_code(), "insufficient_balance");

        assert!(ledger.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_issue_rebalancing_set_with_ether() {
        let (ledger, api) = setup();

        // 5 RB at 4 SET per 1e10 RB needs 20 SET
        api.issue_rebalancing_set_with_ether(ether_request(5, 20), BUYER, q(500))
            .await
            .unwrap();
        assert_eq!(ledger.balance(RB, BUYER), q(5) * Quantity::exp10(10));

        let submitted = ledger.submitted();
        assert_eq!(submitted[0].0.target(), RB_MODULE);
        assert_eq!(submitted[0].1.value, Some(q(500)));
    }

    #[tokio::test]
    async fn test_ether_issuance_checks() {
        let (ledger, api) = setup();

        let err = api
            .issue_rebalancing_set_with_ether(ether_request(5, 20), BUYER, q(499))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::InsufficientValue { required, provided })
                if required == q(500) && provided == q(499)
        ));

        let err = api
            .issue_rebalancing_set_with_ether(ether_request(5, 18), BUYER, q(500))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_quantity");

        let mut request = ether_request(5, 20);
        request.params.send_tokens = vec![A];
        let err = api
            .issue_rebalancing_set_with_ether(request, BUYER, q(500))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::AddressMismatch { name: "payment token", .. })
        ));

        let mut request = ether_request(5, 20);
        request.params.set_address = A;
        let err = api
            .issue_rebalancing_set_with_ether(request, BUYER, q(500))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::AddressMismatch { name: "base set", .. })
        ));

        assert!(ledger.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_ether_issuance_requires_wrapped_ether_configured() {
        let (ledger, _) = setup();
        let mut config = addresses();
        config.wrapped_ether = None;
        let api = ExchangeIssuanceApi::new(ledger.client(), config);

        let err = api
            .issue_rebalancing_set_with_ether(ether_request(5, 20), BUYER, q(500))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: wrappedEtherAddress is not configured");
    }
}
