//! API types for relayer-settled orders and their typed-data payloads
//!
//! Orders follow the CoW protocol order layout, see:
//! <https://docs.cow.fi/cow-protocol/reference/core/signing-schemes>

use std::collections::BTreeMap;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::serialization::u256_string_serialization;

// ---------
// | Types |
// ---------

/// The kind of an off-chain order
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    /// A sell order
    Sell,
    /// A buy order
    Buy,
}

/// The scheme used to sign an order
///
/// We only support EIP-712 signatures
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SigningScheme {
    /// EIP-712 signatures
    Eip712,
}

/// Where the settlement contract pulls or pushes a token balance
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenBalance {
    /// A plain ERC-20 balance
    Erc20,
    /// An external vault balance
    External,
    /// An internal vault balance
    Internal,
}

impl TokenBalance {
    /// The name used inside the typed-data message
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenBalance::Erc20 => "erc20",
            TokenBalance::External => "external",
            TokenBalance::Internal => "internal",
        }
    }
}

/// The message format a signer should use for a typed-data request
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SignedMessageType {
    /// `eth_signTypedData_v4`
    #[default]
    TypedDataV4,
    /// `eth_signTypedData_v3`
    TypedDataV3,
}

/// A single field of an EIP-712 struct type
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TypedField {
    /// The field name
    pub name: String,
    /// The solidity type of the field
    #[serde(rename = "type")]
    pub ty: String,
}

/// The struct definitions of an EIP-712 payload, keyed by type name
pub type TypedFields = BTreeMap<String, Vec<TypedField>>;

/// A typed-data template supplied by the provider
///
/// The template carries the domain and struct definitions but not necessarily
/// the `EIP712Domain` type nor the primary type
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataTemplate {
    /// The EIP-712 domain
    pub domain: serde_json::Map<String, serde_json::Value>,
    /// The struct type definitions
    pub types: TypedFields,
    /// The primary type, if the provider names it
    #[serde(default)]
    pub primary_type: Option<String>,
    /// The message format to request from the signer
    #[serde(default)]
    pub signed_type: SignedMessageType,
}

/// A complete EIP-712 payload, ready to be handed to a signer
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataPayload {
    /// The struct type definitions, including `EIP712Domain`
    pub types: TypedFields,
    /// The primary type of the message
    pub primary_type: String,
    /// The EIP-712 domain
    pub domain: serde_json::Map<String, serde_json::Value>,
    /// The message being signed
    pub message: serde_json::Value,
}

/// A request to sign a typed-data payload
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataSignRequest {
    /// The address expected to sign, lowercased
    pub signer_address: String,
    /// The message format
    pub signed_type: SignedMessageType,
    /// The payload
    pub payload: TypedDataPayload,
    /// The EIP-712 signing hash of the payload, hex encoded
    pub signing_hash: String,
}

/// An unsigned order as quoted by the provider
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedOrder {
    /// The address of the token being sold
    pub sell_token: String,
    /// The address of the token being bought
    pub buy_token: String,
    /// The address receiving the bought tokens
    #[serde(default)]
    pub receiver: String,
    /// The amount of the token being sold, in atoms
    #[serde(with = "u256_string_serialization")]
    pub sell_amount: U256,
    /// The amount of the token being bought, in atoms
    #[serde(with = "u256_string_serialization")]
    pub buy_amount: U256,
    /// The Unix timestamp until which the order is valid
    pub valid_to: u64,
    /// The order's app data, either a JSON document or its 32 byte hash
    pub app_data: String,
    /// Amount of sell token used to cover network fees
    #[serde(with = "u256_string_serialization")]
    pub fee_amount: U256,
    /// The kind of order
    pub kind: OrderKind,
    /// Whether the order is partially fillable (otherwise, fill-or-kill)
    pub partially_fillable: bool,
    /// Where the sold token is pulled from
    #[serde(default)]
    pub sell_token_balance: Option<TokenBalance>,
    /// Where the bought token is pushed to
    #[serde(default)]
    pub buy_token_balance: Option<TokenBalance>,
}

/// The off-chain order attached to a quote that settles through a relayer
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignableOrder {
    /// The typed-data template the order is signed under
    pub template: TypedDataTemplate,
    /// The order as quoted
    pub order: UnsignedOrder,
}

/// A signed order, ready for relayer submission
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    /// The normalized order that was signed
    pub order: UnsignedOrder,
    /// The signature over the order
    pub signature: String,
    /// The scheme the signature was produced with
    pub signing_scheme: SigningScheme,
    /// The network the order settles on
    pub network_id: String,
    /// The provider the order is placed with
    pub provider: String,
    /// The quote the order was derived from
    pub quote_id: String,
    /// The order owner
    pub owner: String,
}

/// The relayer's acknowledgement of a placed order
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    /// The relayer-assigned order identifier
    pub order_id: String,
}

/// The data needed to cancel a resting order
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CancelInfo {
    /// The typed-data template of the cancellation
    pub template: TypedDataTemplate,
    /// The cancellation message
    pub data: serde_json::Value,
}

/// A resting limit order as reported by the relayer
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LimitOrder {
    /// The order identifier
    pub order_id: String,
    /// The network the order lives on
    pub network_id: String,
    /// The provider the order was placed with
    pub provider: String,
    /// The owner of the order
    pub user_address: String,
    /// The account that owns the order locally
    pub account_id: String,
    /// The cancellation payload, absent if the order cannot be cancelled
    #[serde(default)]
    pub cancel_info: Option<CancelInfo>,
}

/// A signed request to cancel orders
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderRequest {
    /// The orders to cancel
    pub order_ids: Vec<String>,
    /// The signature over the cancellation payload
    pub signature: String,
    /// The scheme the signature was produced with
    pub signing_scheme: SigningScheme,
    /// The network the orders live on
    pub network_id: String,
    /// The provider the orders were placed with
    pub provider: String,
    /// The owner of the orders
    pub user_address: String,
}
