//! Contracts of the services the executor drives
//!
//! Each collaborator is a narrow async trait so that wallets, RPC backends and
//! UI confirmation flows can be plugged in without the executor knowing about
//! them.

use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use swap_executor_api::{
    gas::{GasInfoCandidate, SelectedGasInfo},
    orders::{CancelOrderRequest, PlacedOrder, SignedOrder, TypedDataSignRequest},
    quote::{QuoteSnapshot, SwapToken},
    tx::{AccountNode, EncodedTx, SignedTx, SwapBuildResult, SwapInfo, TxIntent, UnsignedTxArtifact},
};

use crate::error::ExecutorResult;

/// The parameters of a quote request
#[derive(Debug, Clone)]
pub struct QuoteRequest {
    /// The token being paid
    pub from_token: SwapToken,
    /// The token being received
    pub to_token: SwapToken,
    /// The pay amount
    pub amount: BigDecimal,
    /// The slippage tolerance, in percent
    pub slippage: BigDecimal,
}

/// Fetches price quotes
#[async_trait]
pub trait QuoteService: Send + Sync {
    /// Fetch the best quote for the request
    async fn fetch(&self, request: QuoteRequest) -> ExecutorResult<QuoteSnapshot>;
}

/// Builds unsigned transactions and swap bodies
#[async_trait]
pub trait TxBuilder: Send + Sync {
    /// Turn an intent into an unsigned transaction for the account
    async fn prepare(
        &self,
        intent: TxIntent,
        quote: &QuoteSnapshot,
        account: &AccountNode,
    ) -> ExecutorResult<UnsignedTxArtifact>;

    /// Ask the provider to build the swap for a quote
    async fn build_swap(
        &self,
        quote: &QuoteSnapshot,
        account: &AccountNode,
        receiving_address: &str,
    ) -> ExecutorResult<SwapBuildResult>;
}

/// Estimates fees
#[async_trait]
pub trait GasService: Send + Sync {
    /// Whether the network can estimate several transactions in one request
    async fn supports_batched_estimation(&self, network_id: &str) -> ExecutorResult<bool>;

    /// Estimate fees for the given bodies, one candidate per body in order
    async fn estimate(
        &self,
        network_id: &str,
        account_id: &str,
        encoded_txs: &[EncodedTx],
    ) -> ExecutorResult<Vec<GasInfoCandidate>>;
}

/// Signs and broadcasts on behalf of the account
#[async_trait]
pub trait SignerService: Send + Sync {
    /// Sign and broadcast a transaction without further user interaction
    async fn sign_and_send(
        &self,
        node: &AccountNode,
        unsigned_tx: &UnsignedTxArtifact,
        gas: &SelectedGasInfo,
    ) -> ExecutorResult<SignedTx>;

    /// Present the transactions to the user for explicit confirmation, then
    /// sign and broadcast them in order
    async fn confirm_and_send(
        &self,
        node: &AccountNode,
        unsigned_txs: &[UnsignedTxArtifact],
    ) -> ExecutorResult<Vec<SignedTx>>;

    /// Sign a typed-data payload, returning the hex encoded signature
    async fn sign_typed_data(
        &self,
        node: &AccountNode,
        request: &TypedDataSignRequest,
    ) -> ExecutorResult<String>;
}

/// Looks up token balances
#[async_trait]
pub trait BalanceService: Send + Sync {
    /// The account's balance of a token, in token units
    async fn token_balance(
        &self,
        node: &AccountNode,
        token: &SwapToken,
    ) -> ExecutorResult<BigDecimal>;
}

/// Records completed swaps
#[async_trait]
pub trait HistoryService: Send + Sync {
    /// Record a completed swap
    async fn record(
        &self,
        swap_info: &SwapInfo,
        tx_id: &str,
        fees: Option<&SelectedGasInfo>,
    ) -> ExecutorResult<()>;
}

/// A user-visible event
#[derive(Debug, Clone, PartialEq)]
pub enum SwapNotification {
    /// An approval was submitted and is awaiting settlement
    ApprovalSubmitted {
        /// The approval transaction
        tx_id: Option<String>,
        /// The spender approved
        spender: String,
        /// The approved amount
        amount: BigDecimal,
        /// Whether the approval resets the allowance to zero
        is_reset: bool,
    },
    /// The final step of a plan completed
    SwapSubmitted {
        /// The final transaction, if one was sent
        tx_id: Option<String>,
        /// The placed order, if any
        order_id: Option<String>,
    },
}

/// Shows user-visible notifications
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Deliver a notification
    async fn notify(&self, notification: SwapNotification) -> ExecutorResult<()>;
}

/// Places and cancels off-chain orders
#[async_trait]
pub trait OrderRelayer: Send + Sync {
    /// Submit a signed order
    async fn submit_order(&self, order: &SignedOrder) -> ExecutorResult<PlacedOrder>;

    /// Cancel previously placed orders
    async fn cancel_orders(&self, request: &CancelOrderRequest) -> ExecutorResult<()>;
}

/// The full set of collaborators an executor needs
#[derive(Clone)]
pub struct Collaborators {
    /// The transaction builder
    pub builder: Arc<dyn TxBuilder>,
    /// The gas service
    pub gas: Arc<dyn GasService>,
    /// The signer
    pub signer: Arc<dyn SignerService>,
    /// The balance lookup
    pub balances: Arc<dyn BalanceService>,
    /// The history recorder
    pub history: Arc<dyn HistoryService>,
    /// The notification sink
    pub notifications: Arc<dyn NotificationService>,
    /// The order relayer
    pub relayer: Arc<dyn OrderRelayer>,
}
