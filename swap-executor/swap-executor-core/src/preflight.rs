//! Checks and estimates run after a quote is accepted and before its plan runs

use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use futures::future::try_join_all;
use serde::Serialize;
use swap_executor_api::{
    gas::SelectedGasInfo,
    quote::{OtherFeeInfo, Protocol, QuoteSnapshot},
    steps::StepType,
    tx::{AccountNode, TxIntent, UnsignedTxArtifact},
};
use tracing::{info, instrument, warn};

use crate::{
    collaborators::{BalanceService, Collaborators},
    error::{ExecutorError, ExecutorResult},
    executor::approval::{approve_amount, chain_nonce},
    gas::{cache::CacheOrigin, GasEngine, LastTxGasHint},
    plan::{NetworkFeeSummary, StepPlan},
};

// -------------
// | Constants |
// -------------

/// The share of the receive amount above which the network cost is flagged
const NETWORK_COST_WARNING_RATIO: &str = "0.1";
/// The decimal places of a reported warning percentage
const WARNING_PERCENT_SCALE: i64 = 2;

// ---------
// | Types |
// ---------

/// The outcome of the checks run before a plan starts
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreflightReport {
    /// The estimated fee of the plan, if it could be estimated
    pub network_fee: Option<NetworkFeeSummary>,
    /// The network cost as a percentage of the receive amount, when the user
    /// must confirm it
    pub network_cost_warning: Option<BigDecimal>,
}

// ---------------
// | Fee Balance |
// ---------------

/// Check one auxiliary fee against the account's balance of its token
async fn check_other_fee(
    balances: &dyn BalanceService,
    account: &AccountNode,
    quote: &QuoteSnapshot,
    fee: &OtherFeeInfo,
) -> ExecutorResult<()> {
    let balance = balances.token_balance(account, &fee.token).await?;
    let mut required = fee.amount.clone();
    if fee.token.same_asset(&quote.from_token) {
        required += &quote.from_amount;
    }

    if balance < required {
        return Err(ExecutorError::insufficient_balance(format!(
            "{} balance {balance} is below the required {required}",
            fee.token.symbol
        )));
    }
    Ok(())
}

/// Check that the account holds every auxiliary fee the route charges
///
/// A fee charged in the pay token must be covered on top of the pay amount
pub async fn check_other_fees(
    balances: &dyn BalanceService,
    account: &AccountNode,
    quote: &QuoteSnapshot,
) -> ExecutorResult<()> {
    let checks = quote.other_fees.iter().map(|fee| check_other_fee(balances, account, quote, fee));
    try_join_all(checks).await?;
    Ok(())
}

// ----------------
// | Network Cost |
// ----------------

/// The network cost warning to show before a quote is accepted, in percent
///
/// Quotes that require an allowance never warn. Limit orders recompute the
/// share from the displayed receive amount and only warn above the threshold
pub fn network_cost_warning(quote: &QuoteSnapshot, to_amount: &BigDecimal) -> Option<BigDecimal> {
    let exceed = quote.network_cost_exceed.as_ref()?;
    if quote.needs_approval() {
        return None;
    }

    let is_limit = quote.protocol == Protocol::Limit;
    if !is_limit || exceed.cost <= BigDecimal::zero() || to_amount.is_zero() {
        return Some(exceed.exceed_percent.clone());
    }

    let ratio = &exceed.cost / to_amount;
    let threshold = BigDecimal::from_str(NETWORK_COST_WARNING_RATIO).unwrap_or_default();
    if ratio <= threshold {
        return None;
    }
    Some((ratio * BigDecimal::from(100)).with_scale(WARNING_PERCENT_SCALE))
}

// ------------
// | Estimate |
// ------------

/// Build every transaction of a plan without sending any of them
async fn build_chain(
    collaborators: &Collaborators,
    plan: &StepPlan,
) -> ExecutorResult<(Vec<UnsignedTxArtifact>, LastTxGasHint)> {
    let quote = &plan.quote;
    let builder = &collaborators.builder;

    let mut approval_types = Vec::new();
    if let Some(allowance) = &quote.allowance {
        if allowance.should_reset_approve {
            approval_types.push(StepType::ApproveReset);
        }
        approval_types.push(StepType::Approve);
    }

    let mut txs: Vec<UnsignedTxArtifact> = Vec::new();
    for step_type in approval_types {
        let allowance = quote.allowance.as_ref().map(|a| a.allowance_target.clone());
        let prev_nonce = txs.last().and_then(|tx| tx.nonce);
        let intent = TxIntent::Approve {
            token: quote.from_token.clone(),
            spender: allowance.unwrap_or_default(),
            amount: approve_amount(step_type, quote, &plan.settings),
            prev_nonce,
        };

        let mut artifact = builder.prepare(intent, quote, &plan.account).await?;
        chain_nonce(&mut artifact, prev_nonce);
        txs.push(artifact);
    }

    if quote.requires_offchain_signature() {
        return Ok((txs, LastTxGasHint::default()));
    }

    let build = builder.build_swap(quote, &plan.account, &plan.receiving_address).await?;
    let hint = LastTxGasHint::from_build(&build, quote);
    if let Some(encoded_tx) = build.encoded_tx.filter(|_| !build.skip_send) {
        let prev_nonce = txs.last().and_then(|tx| tx.nonce);
        let intent = TxIntent::Swap { encoded_tx, prev_nonce };
        let mut artifact = builder.prepare(intent, quote, &plan.account).await?;
        chain_nonce(&mut artifact, prev_nonce);
        txs.push(artifact);
    }

    Ok((txs, hint))
}

/// Sum the fees of a set of estimates
fn summarize(gas: &[SelectedGasInfo]) -> Option<NetworkFeeSummary> {
    let first = gas.first()?;
    let native_fee = gas.iter().map(SelectedGasInfo::native_fee).sum();
    let fiat_fee = gas.iter().map(SelectedGasInfo::fiat_fee).sum();
    Some(NetworkFeeSummary { native_fee, fiat_fee, fee_symbol: first.common.fee_symbol.clone() })
}

/// Estimate the fees of a plan before it runs, populating its gas cache
///
/// Failures are logged and leave the plan without a fee summary
#[instrument(skip_all, fields(plan_id = %plan.plan_id))]
pub async fn pre_estimate(
    collaborators: &Collaborators,
    plan: &mut StepPlan,
) -> Option<NetworkFeeSummary> {
    let data = &plan.pre_swap_data;
    if !data.support_pre_build || data.should_fallback {
        info!("skipping fee estimate before the plan starts");
        return None;
    }

    let engine = GasEngine::new(
        collaborators.gas.clone(),
        data.gas_cache.clone(),
        plan.settings.fee_tier,
        CacheOrigin::Preflight,
    );
    let view: &StepPlan = plan;
    let estimate = async {
        let (txs, hint) = build_chain(collaborators, view).await?;
        engine.estimate_chain(&view.account, &txs, &hint, false /* skip_preflight */).await
    };

    let summary = match estimate.await {
        Ok((mode, gas)) => {
            info!(mode = mode.as_str(), count = gas.len(), "estimated plan fees");
            summarize(&gas)
        },
        Err(e) => {
            warn!(error = %e, "failed to estimate plan fees");
            None
        },
    };

    plan.pre_swap_data.network_fee = summary.clone();
    summary
}

/// Run the checks that must pass before a plan starts
///
/// An auxiliary fee that cannot be covered blocks the plan; a failed fee
/// estimate does not
pub async fn preflight(
    collaborators: &Collaborators,
    plan: &mut StepPlan,
) -> ExecutorResult<PreflightReport> {
    check_other_fees(collaborators.balances.as_ref(), &plan.account, &plan.quote).await?;
    let network_fee = pre_estimate(collaborators, plan).await;
    let network_cost_warning =
        network_cost_warning(&plan.quote, &plan.pre_swap_data.to_token_amount);

    Ok(PreflightReport { network_fee, network_cost_warning })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use swap_executor_api::{quote::NetworkCostExceedInfo, settings::SwapSettings};

    use super::*;
    use crate::{
        cli::ExecutorConfig,
        test_helpers::{
            account, dec, eth, limit_quote, usdc, usdc_to_eth_quote, MockBalances, MockEnv,
            MockGasService, RECEIVER_ADDRESS, USDC_ADDRESS,
        },
    };

    /// Build a plan for the fixture account
    fn build_plan(quote: QuoteSnapshot, batch: bool) -> StepPlan {
        let settings = SwapSettings { batch_approve_and_swap: batch, ..Default::default() };
        let config = ExecutorConfig::default();
        StepPlan::new(quote, account(), RECEIVER_ADDRESS.to_string(), settings, &config)
    }

    /// Balances holding the given amounts of USDC and ETH
    fn balances(usdc_balance: &str, eth_balance: &str) -> MockBalances {
        let usdc_entry = (USDC_ADDRESS.to_string(), dec(usdc_balance));
        let eth_entry = (eth().contract_address, dec(eth_balance));
        MockBalances { balances: [usdc_entry, eth_entry].into_iter().collect() }
    }

    /// A quote charging the given auxiliary fees
    fn quote_with_fees(fees: Vec<OtherFeeInfo>) -> QuoteSnapshot {
        QuoteSnapshot { other_fees: fees, ..usdc_to_eth_quote(false, false) }
    }

    /// Test that auxiliary fees must be covered by the account
    #[tokio::test]
    async fn test_other_fees() {
        let eth_fee = OtherFeeInfo { token: eth(), amount: dec("0.005") };
        let quote = quote_with_fees(vec![eth_fee.clone()]);
        assert!(check_other_fees(&balances("100", "0.01"), &account(), &quote).await.is_ok());

        let err = check_other_fees(&balances("100", "0.001"), &account(), &quote).await;
        assert!(matches!(err, Err(ExecutorError::InsufficientBalance(_))));
    }

    /// Test that a fee in the pay token is covered on top of the pay amount
    #[tokio::test]
    async fn test_other_fee_in_pay_token() {
        let quote = quote_with_fees(vec![OtherFeeInfo { token: usdc(), amount: dec("1") }]);
        let err = check_other_fees(&balances("100", "1"), &account(), &quote).await;
        assert!(matches!(err, Err(ExecutorError::InsufficientBalance(_))));

        assert!(check_other_fees(&balances("101", "1"), &account(), &quote).await.is_ok());
    }

    /// Test the network cost warning of market quotes
    #[test]
    fn test_network_cost_warning_swap() {
        let exceed = NetworkCostExceedInfo { cost: dec("0.01"), exceed_percent: dec("12.5") };
        let quote = QuoteSnapshot {
            network_cost_exceed: Some(exceed.clone()),
            ..usdc_to_eth_quote(false, false)
        };
        assert_eq!(network_cost_warning(&quote, &dec("0.05")), Some(dec("12.5")));

        let approving =
            QuoteSnapshot { network_cost_exceed: Some(exceed), ..usdc_to_eth_quote(true, false) };
        assert_eq!(network_cost_warning(&approving, &dec("0.05")), None);

        assert_eq!(network_cost_warning(&usdc_to_eth_quote(false, false), &dec("0.05")), None);
    }

    /// Test that limit orders recompute the share from the receive amount
    #[test]
    fn test_network_cost_warning_limit() {
        let mut quote = limit_quote();
        quote.allowance = None;

        quote.network_cost_exceed =
            Some(NetworkCostExceedInfo { cost: dec("0.004"), exceed_percent: dec("12") });
        assert_eq!(network_cost_warning(&quote, &dec("0.05")), None);

        quote.network_cost_exceed =
            Some(NetworkCostExceedInfo { cost: dec("0.01"), exceed_percent: dec("12") });
        assert_eq!(network_cost_warning(&quote, &dec("0.05")), Some(dec("20.00")));
    }

    /// Test that a batched plan is estimated in one request
    #[tokio::test]
    async fn test_pre_estimate_batched() {
        let env = MockEnv::default();
        let mut plan = build_plan(usdc_to_eth_quote(true, false), true);

        let summary = pre_estimate(&env.collaborators(), &mut plan).await.unwrap();
        assert_eq!(env.gas.calls().await, vec![2]);
        assert_eq!(plan.pre_swap_data.gas_cache.len(), 2);

        // Two transactions at the average tier of 2 gwei
        let native = dec("0.00024");
        assert_eq!(summary.native_fee, native);
        assert_eq!(summary.fiat_fee, native * dec("2000"));
        assert_eq!(summary.fee_symbol, "ETH");
        assert_eq!(plan.pre_swap_data.network_fee, Some(summary));
    }

    /// Test that an approval chain is estimated with chained nonces
    #[tokio::test]
    async fn test_pre_estimate_chains_nonces() {
        let env = MockEnv { gas: Arc::new(MockGasService::sequential()), ..MockEnv::default() };
        let mut plan = build_plan(usdc_to_eth_quote(true, true), true);

        assert!(pre_estimate(&env.collaborators(), &mut plan).await.is_some());
        assert_eq!(env.gas.calls().await, vec![1, 1]);
        assert_eq!(env.builder.prepared().await.len(), 3);
        assert_eq!(plan.pre_swap_data.gas_cache.len(), 3);
    }

    /// Test that a failed estimate leaves the plan without a summary
    #[tokio::test]
    async fn test_pre_estimate_failure_is_non_fatal() {
        let env = MockEnv { gas: Arc::new(MockGasService::failing()), ..MockEnv::default() };
        let mut plan = build_plan(usdc_to_eth_quote(true, false), true);

        let report = preflight(&env.collaborators(), &mut plan).await.unwrap();
        assert_eq!(report, PreflightReport { network_fee: None, network_cost_warning: None });
        assert!(plan.pre_swap_data.gas_cache.is_empty());
    }

    /// Test that plans starting in fallback are not estimated
    #[tokio::test]
    async fn test_pre_estimate_skipped_in_fallback() {
        let env = MockEnv::default();
        let mut quote = usdc_to_eth_quote(false, false);
        quote.from_token.network_id = "tron--0x2b6653dc".to_string();
        let mut plan = build_plan(quote, false);

        assert!(pre_estimate(&env.collaborators(), &mut plan).await.is_none());
        assert!(env.gas.calls().await.is_empty());
        assert_eq!(env.builder.builds(), 0);
    }

    /// Test that an uncovered fee blocks the plan before any estimate
    #[tokio::test]
    async fn test_preflight_blocks_on_balance() {
        let fee = OtherFeeInfo { token: eth(), amount: dec("1") };
        let env = MockEnv::default();
        let mut plan = build_plan(quote_with_fees(vec![fee]), false);

        let err = preflight(&env.collaborators(), &mut plan).await;
        assert!(matches!(err, Err(ExecutorError::InsufficientBalance(_))));
        assert!(env.gas.calls().await.is_empty());
    }
}
