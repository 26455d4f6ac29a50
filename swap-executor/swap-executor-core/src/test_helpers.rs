//! Fixtures and in-memory collaborators for tests

use std::{
    collections::HashMap,
    str::FromStr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use alloy_primitives::U256;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde_json::json;
use swap_executor_api::{
    gas::{FeeCandidate, FeeCommon, GasInfoCandidate, SelectedGasInfo},
    orders::{
        CancelInfo, CancelOrderRequest, LimitOrder, OrderKind, PlacedOrder, SignableOrder,
        SignedMessageType, SignedOrder, TokenBalance, TypedDataSignRequest, TypedDataTemplate,
        TypedField, UnsignedOrder,
    },
    quote::{AllowanceRequirement, Protocol, ProviderInfo, QuoteKind, QuoteSnapshot, SwapToken},
    tx::{
        AccountKind, AccountNode, EncodedTx, SignedTx, SwapBuildResult, SwapInfo, TxIntent,
        UnsignedTxArtifact,
    },
};
use tokio::sync::Mutex;

use crate::{
    collaborators::{
        BalanceService, Collaborators, GasService, HistoryService, NotificationService,
        OrderRelayer, QuoteRequest, QuoteService, SignerService, SwapNotification, TxBuilder,
    },
    error::{ExecutorError, ExecutorResult},
};

// -------------
// | Constants |
// -------------

/// The network the fixtures live on
pub const NETWORK_ID: &str = "evm--1";
/// The address of the fixture account
pub const ACCOUNT_ADDRESS: &str = "0x00000000000000000000000000000000000a11ce";
/// The address receiving swap output
pub const RECEIVER_ADDRESS: &str = "0x0000000000000000000000000000000000000b0b";
/// The USDC contract
pub const USDC_ADDRESS: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
/// The WETH contract
pub const WETH_ADDRESS: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
/// The swap router
pub const ROUTER_ADDRESS: &str = "0x1111111254eeb25477b68fb85ed929f73a960582";
/// The settlement contract orders are signed against
pub const SETTLEMENT_ADDRESS: &str = "0x9008d19f58aabd9ed0d60971565aa8510560ab41";

// ------------
// | Fixtures |
// ------------

/// Parse a decimal
pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

/// The fixture account
pub fn account() -> AccountNode {
    AccountNode {
        network_id: NETWORK_ID.to_string(),
        account_id: "hd-1--m/44'/60'/0'/0/0".to_string(),
        address: ACCOUNT_ADDRESS.to_string(),
        kind: AccountKind::Hd,
    }
}

/// USDC on mainnet
pub fn usdc() -> SwapToken {
    SwapToken {
        network_id: NETWORK_ID.to_string(),
        contract_address: USDC_ADDRESS.to_string(),
        symbol: "USDC".to_string(),
        decimals: 6,
        is_native: false,
    }
}

/// Native ETH on mainnet
pub fn eth() -> SwapToken {
    SwapToken {
        network_id: NETWORK_ID.to_string(),
        contract_address: String::new(),
        symbol: "ETH".to_string(),
        decimals: 18,
        is_native: true,
    }
}

/// A quote selling 100 USDC for 0.05 ETH
pub fn usdc_to_eth_quote(needs_approval: bool, should_reset: bool) -> QuoteSnapshot {
    let allowance = needs_approval.then(|| AllowanceRequirement {
        allowance_target: ROUTER_ADDRESS.to_string(),
        amount: dec("100"),
        should_reset_approve: should_reset,
    });

    QuoteSnapshot {
        quote_id: "quote-1".to_string(),
        protocol: Protocol::Swap,
        kind: QuoteKind::Sell,
        from_token: usdc(),
        to_token: eth(),
        from_amount: dec("100"),
        to_amount: dec("0.05"),
        allowance,
        gas_limit_hint: None,
        routes: Vec::new(),
        provider: ProviderInfo {
            provider: "swap_1inch".to_string(),
            provider_name: "1inch".to_string(),
        },
        provider_disables_batching: false,
        is_wrapped: false,
        signable_order: None,
        other_fees: Vec::new(),
        network_cost_exceed: None,
        context: json!({}),
    }
}

/// Build a typed field
fn field(name: &str, ty: &str) -> TypedField {
    TypedField { name: name.to_string(), ty: ty.to_string() }
}

/// A settlement order selling 100 USDC for 0.05 WETH
pub fn signable_order() -> SignableOrder {
    let order_fields = vec![
        field("sellToken", "address"),
        field("buyToken", "address"),
        field("receiver", "address"),
        field("sellAmount", "uint256"),
        field("buyAmount", "uint256"),
        field("validTo", "uint32"),
        field("appData", "bytes32"),
        field("feeAmount", "uint256"),
        field("kind", "string"),
        field("partiallyFillable", "bool"),
        field("sellTokenBalance", "string"),
        field("buyTokenBalance", "string"),
    ];

    let domain = json!({
        "name": "Gnosis Protocol",
        "version": "v2",
        "chainId": 1,
        "verifyingContract": SETTLEMENT_ADDRESS,
    });

    SignableOrder {
        template: TypedDataTemplate {
            domain: domain.as_object().cloned().unwrap(),
            types: [("Order".to_string(), order_fields)].into_iter().collect(),
            primary_type: None,
            signed_type: SignedMessageType::TypedDataV4,
        },
        order: UnsignedOrder {
            sell_token: USDC_ADDRESS.to_string(),
            buy_token: WETH_ADDRESS.to_string(),
            receiver: String::new(),
            sell_amount: U256::from(100_000_000u64),
            buy_amount: U256::from(50_000_000_000_000_000u64),
            valid_to: 0,
            app_data: "{\"appCode\":\"swap\"}".to_string(),
            fee_amount: U256::ZERO,
            kind: OrderKind::Sell,
            partially_fillable: false,
            sell_token_balance: None,
            buy_token_balance: Some(TokenBalance::External),
        },
    }
}

/// A resting order of the fixture account with a cancellation payload
pub fn resting_order() -> LimitOrder {
    let domain = json!({
        "name": "Gnosis Protocol",
        "version": "v2",
        "chainId": 1,
        "verifyingContract": SETTLEMENT_ADDRESS,
    });
    let template = TypedDataTemplate {
        domain: domain.as_object().cloned().unwrap(),
        types: [("OrderCancellations".to_string(), vec![field("orderUids", "bytes[]")])].into(),
        primary_type: None,
        signed_type: SignedMessageType::TypedDataV4,
    };

    LimitOrder {
        order_id: "0xdeadbeef".to_string(),
        network_id: NETWORK_ID.to_string(),
        provider: "swap_cow".to_string(),
        user_address: account().address,
        account_id: account().account_id,
        cancel_info: Some(CancelInfo { template, data: json!({ "orderUids": ["0xdeadbeef"] }) }),
    }
}

/// A limit order quote selling 100 USDC for WETH through a relayer
pub fn limit_quote() -> QuoteSnapshot {
    let mut quote = usdc_to_eth_quote(true, false);
    quote.protocol = Protocol::Limit;
    quote.to_token = SwapToken {
        contract_address: WETH_ADDRESS.to_string(),
        symbol: "WETH".to_string(),
        is_native: false,
        ..eth()
    };
    quote.provider = ProviderInfo {
        provider: "swap_cow".to_string(),
        provider_name: "CoW Protocol".to_string(),
    };
    quote.signable_order = Some(signable_order());
    quote
}

/// An encoded transaction calling the router with the given data
pub fn encoded_tx(data: &str) -> EncodedTx {
    EncodedTx(json!({ "to": ROUTER_ADDRESS, "data": data, "value": "0" }))
}

/// An unsigned transaction for the fixture account
pub fn artifact(data: &str) -> UnsignedTxArtifact {
    UnsignedTxArtifact { encoded_tx: encoded_tx(data), nonce: None, step_index: 0, node: account() }
}

/// The fee information shared by fixture estimates
pub fn fee_common() -> FeeCommon {
    FeeCommon {
        fee_symbol: "ETH".to_string(),
        fee_decimals: 18,
        native_token_price: dec("2000"),
        base_fee: None,
    }
}

/// A selected estimate with the given gas limit and a 2 gwei gas price
pub fn selected_gas(gas_limit: u64) -> SelectedGasInfo {
    SelectedGasInfo {
        common: fee_common(),
        fee: FeeCandidate::EvmLegacy { gas_price: U256::from(2_000_000_000u64), gas_limit },
    }
}

// --------------------
// | Mock Gas Service |
// --------------------

/// A gas service returning three EVM tiers per transaction
#[derive(Default)]
pub struct MockGasService {
    /// Whether the network estimates several transactions per request
    pub batch_supported: bool,
    /// Fail every request carrying more than one transaction
    pub fail_batch: bool,
    /// Fail every request
    pub fail_all: bool,
    /// The number of transactions in each request
    calls: Mutex<Vec<usize>>,
}

impl MockGasService {
    /// The gas limit of every estimate
    pub const GAS_LIMIT: u64 = 60_000;

    /// A service for a network with batched estimation
    pub fn batched() -> Self {
        Self { batch_supported: true, ..Default::default() }
    }

    /// A service for a network without batched estimation
    pub fn sequential() -> Self {
        Self::default()
    }

    /// A batching service whose requests all fail
    pub fn failing() -> Self {
        Self { fail_all: true, ..Self::batched() }
    }

    /// A batching service whose multi-transaction requests fail
    pub fn failing_batches() -> Self {
        Self { fail_batch: true, ..Self::batched() }
    }

    /// The gas price of a tier, in wei
    pub fn tier_price(tier: u64) -> U256 {
        U256::from((tier + 1) * 1_000_000_000)
    }

    /// The number of transactions in each request so far
    pub async fn calls(&self) -> Vec<usize> {
        self.calls.lock().await.clone()
    }

    /// The estimate of a single transaction
    fn candidate() -> GasInfoCandidate {
        let tiers = (0..3)
            .map(|tier| FeeCandidate::EvmLegacy {
                gas_price: Self::tier_price(tier),
                gas_limit: Self::GAS_LIMIT,
            })
            .collect();
        GasInfoCandidate { common: fee_common(), tiers }
    }
}

#[async_trait]
impl GasService for MockGasService {
    async fn supports_batched_estimation(&self, _network_id: &str) -> ExecutorResult<bool> {
        Ok(self.batch_supported)
    }

    async fn estimate(
        &self,
        _network_id: &str,
        _account_id: &str,
        encoded_txs: &[EncodedTx],
    ) -> ExecutorResult<Vec<GasInfoCandidate>> {
        self.calls.lock().await.push(encoded_txs.len());
        if self.fail_all || (self.fail_batch && encoded_txs.len() > 1) {
            return Err(ExecutorError::estimate("execution reverted: rpc unavailable"));
        }

        Ok(encoded_txs.iter().map(|_| Self::candidate()).collect())
    }
}

// -------------------
// | Mock Tx Builder |
// -------------------

/// A builder that encodes intents as JSON bodies
pub struct MockTxBuilder {
    /// The nonce the account reports as pending
    pub pending_nonce: u64,
    /// Whether the build reports that nothing must be sent
    pub skip_send: bool,
    /// The order id the build returns
    pub order_id: Option<String>,
    /// The gas limit the build returns
    pub gas_limit: Option<u64>,
    /// The intents prepared so far
    prepared: Mutex<Vec<TxIntent>>,
    /// The number of swap builds so far
    builds: AtomicUsize,
}

impl Default for MockTxBuilder {
    fn default() -> Self {
        Self {
            pending_nonce: 7,
            skip_send: false,
            order_id: None,
            gas_limit: None,
            prepared: Mutex::new(Vec::new()),
            builds: AtomicUsize::new(0),
        }
    }
}

impl MockTxBuilder {
    /// The intents prepared so far
    pub async fn prepared(&self) -> Vec<TxIntent> {
        self.prepared.lock().await.clone()
    }

    /// The number of swap builds so far
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TxBuilder for MockTxBuilder {
    async fn prepare(
        &self,
        intent: TxIntent,
        _quote: &QuoteSnapshot,
        account: &AccountNode,
    ) -> ExecutorResult<UnsignedTxArtifact> {
        let body = match &intent {
            TxIntent::Approve { token, spender, amount, .. } => json!({
                "to": token.contract_address,
                "data": format!("approve({spender},{})", amount.amount),
                "max": amount.is_max,
            }),
            TxIntent::Wrap { direction, contract, amount } => json!({
                "to": contract,
                "data": format!("{direction:?}"),
                "value": amount.to_string(),
            }),
            TxIntent::Swap { encoded_tx, .. } => encoded_tx.0.clone(),
        };
        self.prepared.lock().await.push(intent);

        Ok(UnsignedTxArtifact {
            encoded_tx: EncodedTx(body),
            nonce: Some(self.pending_nonce),
            step_index: 0,
            node: account.clone(),
        })
    }

    async fn build_swap(
        &self,
        quote: &QuoteSnapshot,
        account: &AccountNode,
        receiving_address: &str,
    ) -> ExecutorResult<SwapBuildResult> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let encoded_tx = (!self.skip_send).then(|| encoded_tx("0xswap"));
        let swap_info = SwapInfo {
            protocol: quote.protocol,
            from_token: quote.from_token.clone(),
            to_token: quote.to_token.clone(),
            from_amount: quote.from_amount.clone(),
            to_amount: quote.to_amount.clone(),
            sender_address: account.address.clone(),
            receiving_address: receiving_address.to_string(),
            provider: quote.provider.provider.clone(),
            quote_id: quote.quote_id.clone(),
            order_id: self.order_id.clone(),
        };

        Ok(SwapBuildResult {
            encoded_tx,
            order_id: self.order_id.clone(),
            skip_send: self.skip_send,
            gas_limit: self.gas_limit,
            routes: Vec::new(),
            to_amount: Some(dec("0.0499")),
            swap_info,
        })
    }
}

// ---------------
// | Mock Signer |
// ---------------

/// A signer that records every request
#[derive(Default)]
pub struct MockSigner {
    /// Errors to raise, keyed by the index of the send request
    pub failures: HashMap<usize, ExecutorError>,
    /// Never return from `sign_and_send`
    pub hold: bool,
    /// The transactions sent without confirmation
    sent: Mutex<Vec<(UnsignedTxArtifact, SelectedGasInfo)>>,
    /// The transaction lists sent after confirmation
    confirmed: Mutex<Vec<Vec<UnsignedTxArtifact>>>,
    /// The typed-data requests signed
    typed: Mutex<Vec<TypedDataSignRequest>>,
    /// The accounts that signed each typed-data request
    typed_signers: Mutex<Vec<AccountNode>>,
    /// The number of send requests so far
    requests: AtomicUsize,
}

impl MockSigner {
    /// A signer raising the given error on the given send request
    pub fn failing_on(request: usize, error: ExecutorError) -> Self {
        Self { failures: [(request, error)].into_iter().collect(), ..Default::default() }
    }

    /// A signer whose unconfirmed sends never return
    pub fn holding() -> Self {
        Self { hold: true, ..Default::default() }
    }

    /// The transactions sent without confirmation
    pub async fn sent(&self) -> Vec<(UnsignedTxArtifact, SelectedGasInfo)> {
        self.sent.lock().await.clone()
    }

    /// The transaction lists sent after confirmation
    pub async fn confirmed(&self) -> Vec<Vec<UnsignedTxArtifact>> {
        self.confirmed.lock().await.clone()
    }

    /// The typed-data requests signed
    pub async fn typed(&self) -> Vec<TypedDataSignRequest> {
        self.typed.lock().await.clone()
    }

    /// The accounts that signed each typed-data request
    pub async fn typed_signers(&self) -> Vec<AccountNode> {
        self.typed_signers.lock().await.clone()
    }

    /// Check for a configured failure on the next send request
    fn next_request(&self) -> ExecutorResult<usize> {
        let request = self.requests.fetch_add(1, Ordering::SeqCst);
        match self.failures.get(&request) {
            Some(e) => Err(e.clone()),
            None => Ok(request),
        }
    }

    /// The signed form of a transaction
    fn signed(tx: &UnsignedTxArtifact, request: usize) -> SignedTx {
        SignedTx {
            tx_id: format!("0xtx{request}"),
            signed_payload: format!("0xsigned{request}"),
            nonce: tx.nonce,
        }
    }
}

#[async_trait]
impl SignerService for MockSigner {
    async fn sign_and_send(
        &self,
        _node: &AccountNode,
        unsigned_tx: &UnsignedTxArtifact,
        gas: &SelectedGasInfo,
    ) -> ExecutorResult<SignedTx> {
        let request = self.next_request()?;
        self.sent.lock().await.push((unsigned_tx.clone(), gas.clone()));
        if self.hold {
            std::future::pending::<()>().await;
        }
        tokio::task::yield_now().await;
        Ok(Self::signed(unsigned_tx, request))
    }

    async fn confirm_and_send(
        &self,
        _node: &AccountNode,
        unsigned_txs: &[UnsignedTxArtifact],
    ) -> ExecutorResult<Vec<SignedTx>> {
        let request = self.next_request()?;
        self.confirmed.lock().await.push(unsigned_txs.to_vec());
        Ok(unsigned_txs.iter().map(|tx| Self::signed(tx, request)).collect())
    }

    async fn sign_typed_data(
        &self,
        node: &AccountNode,
        request: &TypedDataSignRequest,
    ) -> ExecutorResult<String> {
        self.next_request()?;
        self.typed.lock().await.push(request.clone());
        self.typed_signers.lock().await.push(node.clone());
        Ok(format!("0x{}", "ab".repeat(65)))
    }
}

// ----------------------------
// | Other Mock Collaborators |
// ----------------------------

/// A balance lookup over a fixed table keyed by contract address
#[derive(Default)]
pub struct MockBalances {
    /// The balances
    pub balances: HashMap<String, BigDecimal>,
}

#[async_trait]
impl BalanceService for MockBalances {
    async fn token_balance(
        &self,
        _node: &AccountNode,
        token: &SwapToken,
    ) -> ExecutorResult<BigDecimal> {
        Ok(self.balances.get(&token.contract_address).cloned().unwrap_or_default())
    }
}

/// A history recorder that keeps every record
#[derive(Default)]
pub struct MockHistory {
    /// The records so far
    records: Mutex<Vec<(SwapInfo, String)>>,
}

impl MockHistory {
    /// The records so far
    pub async fn records(&self) -> Vec<(SwapInfo, String)> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl HistoryService for MockHistory {
    async fn record(
        &self,
        swap_info: &SwapInfo,
        tx_id: &str,
        _fees: Option<&SelectedGasInfo>,
    ) -> ExecutorResult<()> {
        self.records.lock().await.push((swap_info.clone(), tx_id.to_string()));
        Ok(())
    }
}

/// A notification sink that keeps every notification
#[derive(Default)]
pub struct MockNotifications {
    /// Fail every delivery
    pub fail: bool,
    /// The notifications so far
    notes: Mutex<Vec<SwapNotification>>,
}

impl MockNotifications {
    /// A sink that fails every delivery
    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    /// The notifications so far
    pub async fn notes(&self) -> Vec<SwapNotification> {
        self.notes.lock().await.clone()
    }
}

#[async_trait]
impl NotificationService for MockNotifications {
    async fn notify(&self, notification: SwapNotification) -> ExecutorResult<()> {
        self.notes.lock().await.push(notification);
        if self.fail {
            return Err(ExecutorError::custom("toast queue closed"));
        }
        Ok(())
    }
}

/// A relayer that keeps every request
#[derive(Default)]
pub struct MockRelayer {
    /// The orders submitted so far
    submitted: Mutex<Vec<SignedOrder>>,
    /// The cancellations so far
    cancels: Mutex<Vec<CancelOrderRequest>>,
}

impl MockRelayer {
    /// The orders submitted so far
    pub async fn submitted(&self) -> Vec<SignedOrder> {
        self.submitted.lock().await.clone()
    }

    /// The cancellations so far
    pub async fn cancels(&self) -> Vec<CancelOrderRequest> {
        self.cancels.lock().await.clone()
    }
}

#[async_trait]
impl OrderRelayer for MockRelayer {
    async fn submit_order(&self, order: &SignedOrder) -> ExecutorResult<PlacedOrder> {
        let mut submitted = self.submitted.lock().await;
        submitted.push(order.clone());
        Ok(PlacedOrder { order_id: format!("order-{}", submitted.len()) })
    }

    async fn cancel_orders(&self, request: &CancelOrderRequest) -> ExecutorResult<()> {
        self.cancels.lock().await.push(request.clone());
        Ok(())
    }
}

/// A quote service returning a fixed quote
pub struct MockQuoteService {
    /// The quote returned
    pub quote: QuoteSnapshot,
    /// The number of fetches so far
    fetches: AtomicUsize,
}

impl MockQuoteService {
    /// Constructor
    pub fn new(quote: QuoteSnapshot) -> Self {
        Self { quote, fetches: AtomicUsize::new(0) }
    }

    /// The number of fetches so far
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteService for MockQuoteService {
    async fn fetch(&self, request: QuoteRequest) -> ExecutorResult<QuoteSnapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut quote = self.quote.clone();
        quote.from_amount = request.amount;
        Ok(quote)
    }
}

// --------------------
// | Mock Environment |
// --------------------

/// Every mock collaborator, shared with the test for inspection
#[derive(Clone)]
pub struct MockEnv {
    /// The builder
    pub builder: Arc<MockTxBuilder>,
    /// The gas service
    pub gas: Arc<MockGasService>,
    /// The signer
    pub signer: Arc<MockSigner>,
    /// The balance lookup
    pub balances: Arc<MockBalances>,
    /// The history recorder
    pub history: Arc<MockHistory>,
    /// The notification sink
    pub notifications: Arc<MockNotifications>,
    /// The relayer
    pub relayer: Arc<MockRelayer>,
}

impl Default for MockEnv {
    fn default() -> Self {
        Self {
            builder: Arc::new(MockTxBuilder::default()),
            gas: Arc::new(MockGasService::batched()),
            signer: Arc::new(MockSigner::default()),
            balances: Arc::new(MockBalances::default()),
            history: Arc::new(MockHistory::default()),
            notifications: Arc::new(MockNotifications::default()),
            relayer: Arc::new(MockRelayer::default()),
        }
    }
}

impl MockEnv {
    /// The collaborators backed by the mocks
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            builder: self.builder.clone(),
            gas: self.gas.clone(),
            signer: self.signer.clone(),
            balances: self.balances.clone(),
            history: self.history.clone(),
            notifications: self.notifications.clone(),
            relayer: self.relayer.clone(),
        }
    }
}
