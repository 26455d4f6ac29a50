//! Off-chain orders settled by a relayer
//!
//! The provider hands us a typed-data template and an unsigned order. Before
//! signing we fill in the receiver, the validity window and the amounts the
//! user currently sees, complete the EIP-712 payload, and check that it hashes.

use std::str::FromStr;

use alloy_dyn_abi::TypedData;
use alloy_primitives::{hex, keccak256, B256, U256};
use bigdecimal::BigDecimal;
use chrono::Utc;
use num_bigint::{BigInt, Sign};
use serde_json::Value;
use swap_executor_api::{
    orders::{
        CancelOrderRequest, LimitOrder, PlacedOrder, SignedOrder, SigningScheme, TokenBalance,
        TypedDataPayload, TypedDataSignRequest, TypedDataTemplate, TypedField, TypedFields,
        UnsignedOrder,
    },
    quote::{Protocol, QuoteKind, QuoteSnapshot},
    settings::{LimitPriceDisplay, SwapSettings},
    tx::{AccountKind, AccountNode},
};
use tracing::{info, instrument};

use crate::{
    collaborators::{OrderRelayer, SignerService},
    error::{ExecutorError, ExecutorResult},
};

// -------------
// | Constants |
// -------------

/// The name of the EIP-712 domain type
pub const EIP712_DOMAIN_TYPE: &str = "EIP712Domain";

/// The fields an EIP-712 domain may carry, in canonical order
const DOMAIN_FIELDS: [(&str, &str); 5] = [
    ("name", "string"),
    ("version", "string"),
    ("chainId", "uint256"),
    ("verifyingContract", "address"),
    ("salt", "bytes32"),
];

/// The length of a hex encoded 32 byte value, including the `0x` prefix
const HEX_B256_LEN: usize = 66;

// ---------
// | Types |
// ---------

/// The inputs that shape an order at signing time
#[derive(Debug, Clone)]
pub struct OrderInputs<'a> {
    /// The quote the order was derived from
    pub quote: &'a QuoteSnapshot,
    /// The address receiving the bought tokens
    pub receiving_address: &'a str,
    /// The user's settings
    pub settings: &'a SwapSettings,
    /// The limit price amounts the user currently sees
    pub limit_price: &'a LimitPriceDisplay,
    /// The order lifetime, in seconds
    pub expiration_secs: u64,
    /// The current Unix timestamp, in seconds
    pub now_secs: u64,
}

// -------------------
// | Typed Data Prep |
// -------------------

/// Complete a provider template into a signable payload
///
/// The `EIP712Domain` type is derived from the domain fields present when the
/// template omits it, and the primary type is inferred when not named
pub fn normalize_typed_data(
    template: &TypedDataTemplate,
    message: Value,
) -> ExecutorResult<TypedDataPayload> {
    let mut types = template.types.clone();
    types.entry(EIP712_DOMAIN_TYPE.to_string()).or_insert_with(|| {
        DOMAIN_FIELDS
            .iter()
            .filter(|(name, _)| template.domain.contains_key(*name))
            .map(|(name, ty)| TypedField { name: name.to_string(), ty: ty.to_string() })
            .collect()
    });

    let primary_type = match &template.primary_type {
        Some(primary_type) => primary_type.clone(),
        None => infer_primary_type(&types)?,
    };

    Ok(TypedDataPayload { types, primary_type, domain: template.domain.clone(), message })
}

/// Find the struct type that no other struct type references
pub fn infer_primary_type(types: &TypedFields) -> ExecutorResult<String> {
    let referenced = |name: &str| {
        types.values().flatten().any(|field| field.ty.split('[').next() == Some(name))
    };

    let mut candidates =
        types.keys().filter(|name| *name != EIP712_DOMAIN_TYPE && !referenced(name.as_str()));
    match (candidates.next(), candidates.next()) {
        (Some(primary), None) => Ok(primary.clone()),
        (None, _) => Err(ExecutorError::typed_data("no primary type")),
        (Some(a), Some(b)) => {
            Err(ExecutorError::typed_data(format!("ambiguous primary type: {a} or {b}")))
        },
    }
}

/// Compute the EIP-712 signing hash of a payload
pub fn signing_hash(payload: &TypedDataPayload) -> ExecutorResult<B256> {
    let typed: TypedData =
        serde_json::from_value(serde_json::to_value(payload)?).map_err(ExecutorError::typed_data)?;
    typed.eip712_signing_hash().map_err(ExecutorError::typed_data)
}

/// Build the request handed to the signer for a payload
pub fn sign_request(
    template: &TypedDataTemplate,
    payload: TypedDataPayload,
    signer_address: &str,
) -> ExecutorResult<TypedDataSignRequest> {
    let hash = signing_hash(&payload)?;
    Ok(TypedDataSignRequest {
        signer_address: signer_address.to_lowercase(),
        signed_type: template.signed_type,
        payload,
        signing_hash: hex::encode_prefixed(hash),
    })
}

// --------------
// | Order Prep |
// --------------

/// Shift a token amount into integer atoms
pub fn to_atoms(amount: &BigDecimal, decimals: u8) -> ExecutorResult<U256> {
    if amount.sign() == Sign::Minus {
        return Err(ExecutorError::parse(format!("negative amount: {amount}")));
    }

    let scale = BigDecimal::new(BigInt::from(1), -i64::from(decimals));
    let (atoms, _) = (amount * scale).with_scale(0).into_bigint_and_exponent();
    U256::from_str(&atoms.to_string()).map_err(ExecutorError::parse)
}

/// Hash the app data unless it already is a 32 byte hex value
pub fn normalize_app_data(app_data: &str) -> String {
    let is_hash = app_data.len() == HEX_B256_LEN
        && app_data.starts_with("0x")
        && app_data[2..].chars().all(|c| c.is_ascii_hexdigit());
    if is_hash {
        return app_data.to_string();
    }

    hex::encode_prefixed(keccak256(app_data.as_bytes()))
}

/// Normalize where the bought token is pushed to
fn normalize_buy_balance(balance: Option<TokenBalance>) -> TokenBalance {
    match balance {
        None | Some(TokenBalance::Erc20) | Some(TokenBalance::External) => TokenBalance::Erc20,
        Some(TokenBalance::Internal) => TokenBalance::Internal,
    }
}

/// Fill in the signing-time fields of an order
pub fn normalize_order(
    order: &UnsignedOrder,
    inputs: &OrderInputs<'_>,
) -> ExecutorResult<UnsignedOrder> {
    let mut order = order.clone();
    order.receiver = inputs.receiving_address.to_string();
    order.valid_to = inputs
        .now_secs
        .checked_add(inputs.expiration_secs)
        .ok_or_else(|| ExecutorError::app("order expiration is out of range"))?;
    order.partially_fillable = inputs.settings.limit_partially_fillable;
    order.app_data = normalize_app_data(&order.app_data);
    order.sell_token_balance = Some(order.sell_token_balance.unwrap_or(TokenBalance::Erc20));
    order.buy_token_balance = Some(normalize_buy_balance(order.buy_token_balance));

    // Limit orders are signed at the price on screen, not the quoted one. The
    // quote's kind decides which side is fixed; an amount left blank on screen
    // falls back to the quoted amount
    let quote = inputs.quote;
    let limit = inputs.limit_price;
    if quote.protocol == Protocol::Limit && limit.is_set() {
        match quote.kind {
            QuoteKind::Sell => {
                let receive = limit.receive_amount.as_ref().unwrap_or(&quote.to_amount);
                order.buy_amount = to_atoms(receive, quote.to_token.decimals)?;
            },
            QuoteKind::Buy => {
                let pay = limit.pay_amount.as_ref().unwrap_or(&quote.from_amount);
                order.sell_amount = to_atoms(pay, quote.from_token.decimals)?;
            },
        }
    }

    Ok(order)
}

/// The current Unix timestamp, in seconds
pub fn now_secs() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

// ---------------------
// | Signing and Relay |
// ---------------------

/// Normalize, sign and submit the order attached to a quote
#[instrument(skip_all, fields(quote_id = %inputs.quote.quote_id))]
pub async fn sign_and_submit_order(
    signer: &dyn SignerService,
    relayer: &dyn OrderRelayer,
    account: &AccountNode,
    inputs: &OrderInputs<'_>,
) -> ExecutorResult<(SignedOrder, PlacedOrder)> {
    let quote = inputs.quote;
    let signable = quote
        .signable_order
        .as_ref()
        .ok_or_else(|| ExecutorError::invalid_plan("quote carries no order to sign"))?;

    let order = normalize_order(&signable.order, inputs)?;
    let payload = normalize_typed_data(&signable.template, serde_json::to_value(&order)?)?;
    let request = sign_request(&signable.template, payload, &account.address)?;
    let signature = signer.sign_typed_data(account, &request).await?;

    let signed = SignedOrder {
        order,
        signature,
        signing_scheme: SigningScheme::Eip712,
        network_id: quote.from_token.network_id.clone(),
        provider: quote.provider.provider.clone(),
        quote_id: quote.quote_id.clone(),
        owner: account.address.clone(),
    };
    let placed = relayer.submit_order(&signed).await?;
    info!(order_id = %placed.order_id, "placed order");

    Ok((signed, placed))
}

/// The account that placed a resting order
fn order_owner(order: &LimitOrder, kind: AccountKind) -> AccountNode {
    AccountNode {
        network_id: order.network_id.clone(),
        account_id: order.account_id.clone(),
        address: order.user_address.clone(),
        kind,
    }
}

/// Cancel a resting order
///
/// The cancellation payload goes through the same normalization as orders
/// and the relayer is called once with the resulting signature
#[instrument(skip_all, fields(order_id = %order.order_id))]
///
/// The payload is signed by the account that placed the order, which need not
/// be the account of the current session
pub async fn cancel_order(
    signer: &dyn SignerService,
    relayer: &dyn OrderRelayer,
    kind: AccountKind,
    order: &LimitOrder,
) -> ExecutorResult<()> {
    let cancel_info = order
        .cancel_info
        .as_ref()
        .ok_or_else(|| {
            ExecutorError::app(format!("order {} cannot be cancelled", order.order_id))
        })?;

    let payload = normalize_typed_data(&cancel_info.template, cancel_info.data.clone())?;
    let request = sign_request(&cancel_info.template, payload, &order.user_address)?;
    let signature = signer.sign_typed_data(&order_owner(order, kind), &request).await?;

    let cancel = CancelOrderRequest {
        order_ids: vec![order.order_id.clone()],
        signature,
        signing_scheme: SigningScheme::Eip712,
        network_id: order.network_id.clone(),
        provider: order.provider.clone(),
        user_address: order.user_address.clone(),
    };
    relayer.cancel_orders(&cancel).await?;
    info!("cancelled order");

    Ok(())
}
