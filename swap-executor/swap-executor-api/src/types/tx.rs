//! API types for transactions moving between the builder, gas service and
//! signer
use alloy_primitives::{keccak256, B256};
use bigdecimal::BigDecimal;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::quote::{Protocol, Route, SwapToken};

// ---------
// | Types |
// ---------

/// The signing capability of an account
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    /// A hot wallet derived from a local seed
    Hd,
    /// A hot wallet backed by an imported key
    Imported,
    /// A hardware signer
    Hardware,
    /// An air-gapped signer driven through QR codes
    Qr,
    /// An externally connected wallet
    External,
}

impl AccountKind {
    /// Whether every signature goes through an interactive device or wallet
    pub fn signs_every_time(&self) -> bool {
        matches!(self, AccountKind::Hardware | AccountKind::Qr | AccountKind::External)
    }
}

/// The account and network a transaction is built for
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountNode {
    /// The network identifier
    pub network_id: String,
    /// The account identifier
    pub account_id: String,
    /// The account's address on the network
    pub address: String,
    /// The signing capability of the account
    pub kind: AccountKind,
}

/// An opaque encoded transaction body
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct EncodedTx(pub serde_json::Value);

impl EncodedTx {
    /// A structural hash of the body
    ///
    /// Object keys are serialized in sorted order, so two bodies with the same
    /// fields hash identically regardless of construction order
    pub fn structural_hash(&self) -> B256 {
        let mut buf = Vec::new();
        write_canonical(&self.0, &mut buf);
        keccak256(buf)
    }
}

/// Write a JSON value with object keys in sorted order
fn write_canonical(value: &serde_json::Value, buf: &mut Vec<u8>) {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            buf.push(b'{');
            for (i, key) in map.keys().sorted().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                write_canonical(&Value::String(key.clone()), buf);
                buf.push(b':');
                write_canonical(&map[key], buf);
            }
            buf.push(b'}');
        },
        Value::Array(items) => {
            buf.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                write_canonical(item, buf);
            }
            buf.push(b']');
        },
        scalar => buf.extend_from_slice(scalar.to_string().as_bytes()),
    }
}

/// An unsigned transaction produced by the builder for a plan step
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTxArtifact {
    /// The encoded transaction body
    pub encoded_tx: EncodedTx,
    /// The nonce the transaction will be sent with, if the chain uses nonces
    #[serde(default)]
    pub nonce: Option<u64>,
    /// The index of the plan step that produced the transaction
    pub step_index: usize,
    /// The account and network the transaction belongs to
    pub node: AccountNode,
}

/// The result of signing and broadcasting a transaction
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignedTx {
    /// The transaction id on chain
    pub tx_id: String,
    /// The raw signed payload
    pub signed_payload: String,
    /// The nonce the transaction consumed
    #[serde(default)]
    pub nonce: Option<u64>,
}

/// The amount of an approval
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApproveAmount {
    /// The amount in token units
    pub amount: BigDecimal,
    /// Whether to approve the maximum amount instead
    pub is_max: bool,
}

/// The direction of a wrap
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WrapDirection {
    /// Native asset into its wrapped token
    Deposit,
    /// Wrapped token back into the native asset
    Withdraw,
}

/// What a transaction is meant to do
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "intent", rename_all = "camelCase")]
pub enum TxIntent {
    /// Grant an allowance to a spender
    #[serde(rename_all = "camelCase")]
    Approve {
        /// The token being approved
        token: SwapToken,
        /// The spender being approved
        spender: String,
        /// The allowance amount
        amount: ApproveAmount,
        /// The nonce of the transaction this one must follow
        prev_nonce: Option<u64>,
    },
    /// Convert between the native asset and its wrapped token
    #[serde(rename_all = "camelCase")]
    Wrap {
        /// The wrap direction
        direction: WrapDirection,
        /// The wrapped token contract
        contract: String,
        /// The amount to convert
        amount: BigDecimal,
    },
    /// Send a swap body returned by the build endpoint
    #[serde(rename_all = "camelCase")]
    Swap {
        /// The body returned by the build endpoint
        encoded_tx: EncodedTx,
        /// The nonce of the transaction this one must follow
        prev_nonce: Option<u64>,
    },
}

/// The swap details recorded in history
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SwapInfo {
    /// The settlement protocol
    pub protocol: Protocol,
    /// The token paid
    pub from_token: SwapToken,
    /// The token received
    pub to_token: SwapToken,
    /// The amount paid
    pub from_amount: BigDecimal,
    /// The amount received
    pub to_amount: BigDecimal,
    /// The paying address
    pub sender_address: String,
    /// The receiving address
    pub receiving_address: String,
    /// The provider used
    pub provider: String,
    /// The quote the swap was built from
    pub quote_id: String,
    /// The provider's order id, if any
    #[serde(default)]
    pub order_id: Option<String>,
}

/// The response of the swap build endpoint
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SwapBuildResult {
    /// The swap body to send, absent for orders accepted without a transaction
    #[serde(default)]
    pub encoded_tx: Option<EncodedTx>,
    /// The provider's order id
    #[serde(default)]
    pub order_id: Option<String>,
    /// Whether the build already placed the order and nothing must be sent
    #[serde(default)]
    pub skip_send: bool,
    /// The gas limit of the swap transaction
    #[serde(default)]
    pub gas_limit: Option<u64>,
    /// The routes of the built swap
    #[serde(default)]
    pub routes: Vec<Route>,
    /// The receive amount after re-simulation
    #[serde(default)]
    pub to_amount: Option<BigDecimal>,
    /// The swap details to record
    pub swap_info: SwapInfo,
}
