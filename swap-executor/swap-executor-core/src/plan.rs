//! The step plan: an ordered list of typed steps derived once per accepted
//! quote, plus the working state the executor keeps alongside it

use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use serde::Serialize;
use swap_executor_api::{
    quote::QuoteSnapshot,
    settings::{LimitPriceDisplay, SwapSettings},
    steps::{BatchTransferType, StepStatus, StepType, SwapStep},
    tx::{AccountNode, SwapInfo, UnsignedTxArtifact},
};
use uuid::Uuid;

use crate::{
    classifier::{classify, ClassifierInput},
    cli::ExecutorConfig,
    gas::cache::GasInfoCache,
};

// ---------
// | Types |
// ---------

/// The fee totals computed before a plan starts
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFeeSummary {
    /// The summed maximum fee, in units of the fee token
    pub native_fee: BigDecimal,
    /// The summed maximum fee, in fiat
    pub fiat_fee: BigDecimal,
    /// The fee token symbol
    pub fee_symbol: String,
}

/// Per-plan working state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreSwapData {
    /// How approval and swap are grouped
    pub batch_transfer_type: BatchTransferType,
    /// Whether each transaction now needs explicit user confirmation
    pub should_fallback: bool,
    /// Whether fees estimated before the plan started must be re-estimated
    pub need_fetch_gas: bool,
    /// Whether an interactive signer must approve and swap separately
    pub is_hardware_or_external_batch: bool,
    /// Whether fees may be estimated before the plan starts
    pub support_pre_build: bool,
    /// The receive amount, updated from the build result
    pub to_token_amount: BigDecimal,
    /// The transactions built for each step, keyed by step index
    pub artifacts: BTreeMap<usize, Vec<UnsignedTxArtifact>>,
    /// The nonce of the sent allowance reset, which the approval follows
    pub reset_nonce: Option<u64>,
    /// Whether the completed swap has been recorded in history
    pub history_recorded: bool,
    /// The fee totals computed before the plan started
    pub network_fee: Option<NetworkFeeSummary>,
    /// Fee estimates keyed by transaction body
    #[serde(skip)]
    pub gas_cache: GasInfoCache,
}

/// A step plan and the quote it was derived from
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPlan {
    /// A unique id for logging
    pub plan_id: Uuid,
    /// The steps, in execution order
    pub steps: Vec<SwapStep>,
    /// The working state
    pub pre_swap_data: PreSwapData,
    /// The accepted quote
    pub quote: QuoteSnapshot,
    /// The paying account
    pub account: AccountNode,
    /// The address receiving the swap output
    pub receiving_address: String,
    /// The user preferences captured at acceptance
    pub settings: SwapSettings,
    /// The limit price on screen at acceptance
    pub limit_price: LimitPriceDisplay,
    /// Whether the session abandoned the plan
    pub abandoned: bool,
}

impl StepPlan {
    /// Derive the plan for an accepted quote
    pub fn new(
        quote: QuoteSnapshot,
        account: AccountNode,
        receiving_address: String,
        settings: SwapSettings,
        config: &ExecutorConfig,
    ) -> Self {
        let network_id = quote.from_token.network_id.clone();
        let needs_approval = quote.needs_approval();
        let batch_transfer_type = classify(
            &ClassifierInput {
                network_id: &network_id,
                account_kind: account.kind,
                provider_disables_batching: quote.provider_disables_batching,
                requires_offchain_signature: quote.requires_offchain_signature(),
                needs_approval,
                user_batch_preference: settings.batch_approve_and_swap,
            },
            config,
        );

        let steps = plan_steps(&quote, batch_transfer_type);
        let support_pre_build = !quote.is_wrapped
            && (!needs_approval
                || (!quote.provider_disables_batching && !config.batch_unsupported(&network_id)));

        let pre_swap_data = PreSwapData {
            batch_transfer_type,
            should_fallback: config.starts_in_fallback(&network_id),
            need_fetch_gas: needs_approval && !batch_transfer_type.is_merged(),
            is_hardware_or_external_batch: account.kind.signs_every_time() && needs_approval,
            support_pre_build,
            to_token_amount: quote.to_amount.clone(),
            artifacts: BTreeMap::new(),
            reset_nonce: None,
            history_recorded: false,
            network_fee: None,
            gas_cache: GasInfoCache::default(),
        };

        Self {
            plan_id: Uuid::new_v4(),
            steps,
            pre_swap_data,
            quote,
            account,
            receiving_address,
            settings,
            limit_price: LimitPriceDisplay::default(),
            abandoned: false,
        }
    }

    /// Attach the limit price on screen at acceptance
    pub fn with_limit_price(mut self, limit_price: LimitPriceDisplay) -> Self {
        self.limit_price = limit_price;
        self
    }

    /// The swap details recorded in history when no build supplied them
    pub fn swap_info(&self, order_id: Option<String>) -> SwapInfo {
        SwapInfo {
            protocol: self.quote.protocol,
            from_token: self.quote.from_token.clone(),
            to_token: self.quote.to_token.clone(),
            from_amount: self.quote.from_amount.clone(),
            to_amount: self.pre_swap_data.to_token_amount.clone(),
            sender_address: self.account.address.clone(),
            receiving_address: self.receiving_address.clone(),
            provider: self.quote.provider.provider.clone(),
            quote_id: self.quote.quote_id.clone(),
            order_id,
        }
    }

    /// The index of the last step
    pub fn last_index(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    /// Whether the last step has been submitted
    pub fn is_complete(&self) -> bool {
        self.steps
            .last()
            .is_some_and(|s| matches!(s.status, StepStatus::Success | StepStatus::Pending))
    }

    /// The types of the steps, in order
    pub fn step_types(&self) -> Vec<StepType> {
        self.steps.iter().map(|s| s.step_type).collect()
    }
}

/// Derive the ordered steps for a quote under a batch classification
///
/// The result depends only on the quote's protocol flags and the
/// classification
pub fn plan_steps(quote: &QuoteSnapshot, batch_type: BatchTransferType) -> Vec<SwapStep> {
    if quote.is_wrapped {
        return vec![SwapStep::new(StepType::Wrap)];
    }

    let mut steps = Vec::new();
    if batch_type.is_merged() && quote.needs_approval() && !quote.requires_offchain_signature() {
        steps.push(SwapStep::new(StepType::BatchApproveAndSend));
        return steps;
    }

    if quote.needs_approval() {
        if quote.should_reset_approve() {
            steps.push(SwapStep::new(StepType::ApproveReset));
        }
        steps.push(SwapStep::new(StepType::Approve));
    }

    let last = if quote.requires_offchain_signature() {
        StepType::SignMessage
    } else {
        StepType::Send
    };
    steps.push(SwapStep::new(last));
    steps
}
