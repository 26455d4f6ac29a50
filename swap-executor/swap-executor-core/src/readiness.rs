//! Quote readiness evaluation
//!
//! The tracker holds the candidate quote for a swap screen along with the
//! counters that invalidate it. Each cycle the screen hands the evaluator an
//! immutable snapshot of the live inputs; the evaluator decides whether the
//! held quote is stale and which action the screen should offer.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc, RwLock,
};

use bigdecimal::{BigDecimal, Zero};
use serde::Serialize;
use swap_executor_api::quote::{Protocol, QuoteKind, QuoteSnapshot, SwapToken};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::{
    cli::ExecutorConfig,
    collaborators::{QuoteRequest, QuoteService},
    error::{ExecutorError, ExecutorResult},
};

// ---------
// | Types |
// ---------

/// The tab selected on the swap screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwapTab {
    /// Same-network market swaps
    #[default]
    Swap,
    /// Cross-network swaps
    Bridge,
    /// Limit orders
    Limit,
}

impl SwapTab {
    /// Whether quotes of the given protocol belong on this tab
    pub fn accepts(&self, protocol: Protocol) -> bool {
        match protocol {
            Protocol::Limit => *self == SwapTab::Limit,
            Protocol::Swap | Protocol::Bridge => matches!(self, SwapTab::Swap | SwapTab::Bridge),
        }
    }
}

/// A snapshot of the user's inputs, taken once per evaluation cycle
#[derive(Debug, Clone, Default)]
pub struct LiveInputs {
    /// The selected pay token
    pub from_token: Option<SwapToken>,
    /// The selected receive token
    pub to_token: Option<SwapToken>,
    /// The entered pay amount
    pub from_amount: Option<BigDecimal>,
    /// The displayed receive amount
    pub to_amount: Option<BigDecimal>,
    /// The paying address
    pub from_address: Option<String>,
    /// The receiving address
    pub to_address: Option<String>,
    /// The pay token balance
    pub from_balance: Option<BigDecimal>,
    /// The limit rate entered on the limit tab
    pub limit_rate: Option<BigDecimal>,
    /// The selected tab
    pub tab: SwapTab,
    /// Whether a quote request is in flight
    pub quote_loading: bool,
    /// Whether a swap build is in flight
    pub build_in_flight: bool,
}

/// Why the continue action is disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledReason {
    /// No quote is held
    NoQuote,
    /// The paying or receiving address is missing
    MissingAddress,
    /// A sell quote was priced for a different amount
    AmountMismatch,
    /// The quote's protocol does not belong on the selected tab
    ProtocolMismatch,
    /// The receive amount is zero
    ZeroReceiveAmount,
    /// A quote or build is in flight
    Busy,
    /// No provider can fill the trade
    NoProvider,
    /// A limit order needs a price
    EnterLimitPrice,
    /// A receiving address must be entered
    EnterRecipient,
    /// The pay token balance is below the pay amount
    InsufficientBalance,
    /// A token must be selected
    SelectToken,
    /// An amount must be entered
    EnterAmount,
}

/// The action the swap screen offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "reason", rename_all = "snake_case")]
pub enum ActionState {
    /// Accept the quote and start the plan
    Continue,
    /// Refresh the stale quote
    Refresh,
    /// No action is available
    Disabled(DisabledReason),
}

/// The verdict of one evaluation cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    /// Whether the held quote must be refreshed before it is accepted
    pub is_stale: bool,
    /// Whether the quote no longer matches the live inputs
    pub quote_mismatch: bool,
    /// The offered action
    pub action: ActionState,
}

// ----------------
// | Quote Checks |
// ----------------

/// Whether two tokens are the same asset on the same network
fn same_token(quoted: &SwapToken, live: Option<&SwapToken>) -> bool {
    live.is_some_and(|live| quoted.same_asset(live))
}

/// Whether a quote no longer matches the live inputs
///
/// Amounts are compared numerically
pub fn quote_mismatch(quote: &QuoteSnapshot, inputs: &LiveInputs) -> bool {
    if !same_token(&quote.from_token, inputs.from_token.as_ref())
        || !same_token(&quote.to_token, inputs.to_token.as_ref())
    {
        return true;
    }

    let priced_for_sell = quote.protocol != Protocol::Limit && quote.kind == QuoteKind::Sell;
    match (&quote.allowance, priced_for_sell) {
        (Some(allowance), true) => inputs.from_amount.as_ref() != Some(&allowance.amount),
        _ => false,
    }
}

/// Whether an amount is absent or zero
fn is_zero(amount: Option<&BigDecimal>) -> bool {
    amount.map_or(true, BigDecimal::is_zero)
}

/// The reason the continue action is disabled, if any
///
/// Later checks take precedence over earlier ones, as their reasons are the
/// more specific instruction to the user
fn disabled_reason(quote: Option<&QuoteSnapshot>, inputs: &LiveInputs) -> Option<DisabledReason> {
    if inputs.quote_loading || inputs.build_in_flight {
        return Some(DisabledReason::Busy);
    }

    let Some(quote) = quote else {
        return specific_reason(None, inputs).or(Some(DisabledReason::NoQuote));
    };

    let mut reason = None;
    if inputs.from_address.is_none() || inputs.to_address.is_none() {
        reason = Some(DisabledReason::MissingAddress);
    }
    if quote.kind == QuoteKind::Sell && inputs.from_amount.as_ref() != Some(&quote.from_amount) {
        reason = Some(DisabledReason::AmountMismatch);
    }
    if !inputs.tab.accepts(quote.protocol) {
        reason = Some(DisabledReason::ProtocolMismatch);
    }
    if is_zero(inputs.to_amount.as_ref()) {
        reason = Some(DisabledReason::ZeroReceiveAmount);
    }

    specific_reason(Some(quote), inputs).or(reason)
}

/// The instruction-carrying reasons, in increasing precedence
fn specific_reason(quote: Option<&QuoteSnapshot>, inputs: &LiveInputs) -> Option<DisabledReason> {
    let mut reason = None;
    if let Some(quote) = quote {
        let is_limit = quote.protocol == Protocol::Limit;
        if quote.to_amount.is_zero() && !is_limit {
            reason = Some(DisabledReason::NoProvider);
        }
        if is_limit
            && !quote.is_wrapped
            && quote.allowance.is_none()
            && is_zero(inputs.limit_rate.as_ref())
        {
            reason = Some(DisabledReason::EnterLimitPrice);
        }
        if !quote.to_amount.is_zero() && inputs.to_address.is_none() {
            reason = Some(DisabledReason::EnterRecipient);
        }
    }

    let balance = inputs.from_balance.clone().unwrap_or_default();
    let amount = inputs.from_amount.clone().unwrap_or_default();
    if inputs.from_token.is_some() && inputs.from_address.is_some() && balance < amount {
        reason = Some(DisabledReason::InsufficientBalance);
    }
    if inputs.from_token.is_none() || inputs.to_token.is_none() {
        reason = Some(DisabledReason::SelectToken);
    }
    if is_zero(inputs.from_amount.as_ref()) {
        reason = Some(DisabledReason::EnterAmount);
    }

    reason
}

// -----------------
// | Quote Tracker |
// -----------------

/// The shared state of a quote tracker
#[derive(Debug)]
struct TrackerInner {
    /// The quote a plan would be accepted from
    candidate: RwLock<Option<QuoteSnapshot>>,
    /// The poll intervals elapsed since the candidate was fetched
    interval_count: AtomicU32,
    /// Whether the user asked for a refresh
    refresh_requested: AtomicBool,
    /// Whether a plan accepted from the candidate is still running
    plan_running: AtomicBool,
    /// The interval count after which the candidate is stale
    max_count: u32,
}

/// Holds the candidate quote of a swap screen and decides when it is stale
#[derive(Debug, Clone)]
pub struct QuoteTracker {
    /// The shared state
    inner: Arc<TrackerInner>,
}

impl QuoteTracker {
    /// Constructor
    pub fn new(config: &ExecutorConfig) -> Self {
        let inner = TrackerInner {
            candidate: RwLock::new(None),
            interval_count: AtomicU32::new(0),
            refresh_requested: AtomicBool::new(false),
            plan_running: AtomicBool::new(false),
            max_count: config.quote_interval_max_count,
        };

        Self { inner: Arc::new(inner) }
    }

    /// The candidate quote
    pub fn candidate(&self) -> Option<QuoteSnapshot> {
        self.inner.candidate.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the candidate quote and reset the staleness counters
    pub fn set_candidate(&self, quote: QuoteSnapshot) {
        *self.inner.candidate.write().unwrap_or_else(|e| e.into_inner()) = Some(quote);
        self.inner.interval_count.store(0, Ordering::SeqCst);
        self.inner.refresh_requested.store(false, Ordering::SeqCst);
    }

    /// Count one elapsed poll interval, returning the new count
    pub fn tick(&self) -> u32 {
        self.inner.interval_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The poll intervals elapsed since the candidate was fetched
    pub fn interval_count(&self) -> u32 {
        self.inner.interval_count.load(Ordering::SeqCst)
    }

    /// Mark the candidate stale until the next refresh
    pub fn request_refresh(&self) {
        self.inner.refresh_requested.store(true, Ordering::SeqCst);
    }

    /// Whether a plan accepted from the candidate is still running
    pub fn plan_running(&self) -> bool {
        self.inner.plan_running.load(Ordering::SeqCst)
    }

    /// Record that the plan accepted from the candidate has stopped
    pub fn release(&self) {
        self.inner.plan_running.store(false, Ordering::SeqCst);
    }

    /// Count poll intervals in the background
    pub fn spawn_ticker(&self, config: &ExecutorConfig) -> JoinHandle<()> {
        let tracker = self.clone();
        let period = config.quote_fetch_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let count = tracker.tick();
                debug!(count, "quote poll interval elapsed");
            }
        })
    }

    /// Refresh the candidate in the background
    ///
    /// Fetch failures are logged and retried on the next interval
    pub fn spawn_refresher(
        &self,
        service: Arc<dyn QuoteService>,
        request: QuoteRequest,
        config: &ExecutorConfig,
    ) -> JoinHandle<()> {
        let tracker = self.clone();
        let period = config.refresh_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = tracker.refresh(service.as_ref(), request.clone()).await {
                    warn!("failed to refresh quote: {e}");
                }
            }
        })
    }

    /// Fetch a new candidate quote
    ///
    /// The candidate is left in place while a plan accepted from it runs;
    /// returns whether it was replaced
    #[instrument(skip_all)]
    pub async fn refresh(
        &self,
        service: &dyn QuoteService,
        request: QuoteRequest,
    ) -> ExecutorResult<bool> {
        if self.plan_running() {
            info!("plan is running, keeping the candidate quote");
            return Ok(false);
        }

        let quote = service.fetch(request).await?;
        if self.plan_running() {
            info!("plan started during refresh, discarding the fetched quote");
            return Ok(false);
        }

        info!(quote_id = %quote.quote_id, "replaced candidate quote");
        self.set_candidate(quote);
        Ok(true)
    }

    /// Evaluate the candidate against the live inputs
    pub fn evaluate(&self, inputs: &LiveInputs) -> Readiness {
        let candidate = self.candidate();
        let quote_mismatch = candidate.as_ref().is_some_and(|q| quote_mismatch(q, inputs));
        let is_stale = self.interval_count() > self.inner.max_count
            || self.inner.refresh_requested.load(Ordering::SeqCst)
            || quote_mismatch;

        let action = match disabled_reason(candidate.as_ref(), inputs) {
            Some(DisabledReason::Busy) => ActionState::Disabled(DisabledReason::Busy),
            _ if is_stale => ActionState::Refresh,
            Some(reason) => ActionState::Disabled(reason),
            None => ActionState::Continue,
        };

        Readiness { is_stale, quote_mismatch, action }
    }

    /// Accept the candidate for a new plan
    ///
    /// Fails with a quote mismatch unless the screen offers to continue
    pub fn accept(&self, inputs: &LiveInputs) -> ExecutorResult<QuoteSnapshot> {
        let readiness = self.evaluate(inputs);
        if readiness.is_stale {
            return Err(ExecutorError::quote_mismatch("quote is stale, refresh it first"));
        }
        if let ActionState::Disabled(reason) = readiness.action {
            let message = format!("quote cannot be accepted: {reason:?}");
            return Err(ExecutorError::quote_mismatch(message));
        }

        let quote = self.candidate().ok_or_else(|| ExecutorError::quote_mismatch("no quote"))?;
        self.inner.plan_running.store(true, Ordering::SeqCst);
        Ok(quote)
    }
}
