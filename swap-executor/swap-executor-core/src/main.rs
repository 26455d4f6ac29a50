//! The swap planner, a dry run of the swap executor
//!
//! Reads a quote snapshot, derives the step plan the executor would run for
//! it, and prints the plan alongside the readiness verdict for the entered
//! amount. Nothing is signed or sent.
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(unsafe_code)]

use std::{error::Error, str::FromStr};

use bigdecimal::BigDecimal;
use clap::Parser;
use serde_json::json;
use swap_executor::{
    cli::Cli,
    error::ExecutorError,
    plan::StepPlan,
    preflight::network_cost_warning,
    readiness::{LiveInputs, QuoteTracker, SwapTab},
    relayer_client::HttpOrderRelayer,
    telemetry::setup_logging,
};
use swap_executor_api::{
    quote::{Protocol, QuoteSnapshot},
    settings::SwapSettings,
    tx::AccountNode,
};
use tracing::{info, warn};

/// The account identifier used for the dry-run account
const DRY_RUN_ACCOUNT_ID: &str = "swap-planner";

/// Parse a decimal amount from the command line
fn parse_amount(amount: &str) -> Result<BigDecimal, ExecutorError> {
    BigDecimal::from_str(amount).map_err(ExecutorError::parse)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    cli.validate()?;
    setup_logging(cli.json_logs);

    let quote_json = tokio::fs::read_to_string(&cli.quote_path).await?;
    let quote: QuoteSnapshot = serde_json::from_str(&quote_json)?;
    info!(quote_id = %quote.quote_id, provider = %quote.provider.provider, "loaded quote");

    let live_amount = match &cli.live_amount {
        Some(amount) => parse_amount(amount)?,
        None => quote.from_amount.clone(),
    };
    let balance = cli.balance.as_deref().map(parse_amount).transpose()?;

    let config = cli.executor.to_config();
    let relayer = HttpOrderRelayer::from_config(&config)?;
    match &relayer {
        Some(relayer) => info!(base_url = relayer.base_url(), "relaying orders"),
        None if quote.requires_offchain_signature() => warn!("no relayer configured for order"),
        None => {},
    }
    let address = cli.address.clone().unwrap_or_default();
    let receiving_address = cli.receiving_address.clone().unwrap_or_else(|| address.clone());
    let account = AccountNode {
        network_id: quote.from_token.network_id.clone(),
        account_id: DRY_RUN_ACCOUNT_ID.to_string(),
        address: address.clone(),
        kind: cli.account_kind.into(),
    };
    let settings = SwapSettings {
        batch_approve_and_swap: cli.batch_approve_and_swap,
        fee_tier: cli.fee_tier.into(),
        ..Default::default()
    };

    // Evaluate readiness as the swap screen would with the entered amount
    let tab = match quote.protocol {
        Protocol::Limit => SwapTab::Limit,
        Protocol::Swap => SwapTab::Swap,
        Protocol::Bridge => SwapTab::Bridge,
    };
    let inputs = LiveInputs {
        from_token: Some(quote.from_token.clone()),
        to_token: Some(quote.to_token.clone()),
        from_amount: Some(live_amount),
        to_amount: Some(quote.to_amount.clone()),
        from_address: cli.address.clone(),
        to_address: Some(receiving_address.clone()).filter(|a| !a.is_empty()),
        from_balance: balance,
        limit_rate: None,
        tab,
        quote_loading: false,
        build_in_flight: false,
    };
    let tracker = QuoteTracker::new(&config);
    tracker.set_candidate(quote.clone());
    let readiness = tracker.evaluate(&inputs);

    let warning = network_cost_warning(&quote, &quote.to_amount);
    let plan = StepPlan::new(quote, account, receiving_address, settings, &config);
    info!(
        plan_id = %plan.plan_id,
        batch_transfer_type = ?plan.pre_swap_data.batch_transfer_type,
        steps = plan.steps.len(),
        "derived step plan"
    );

    let report = json!({
        "plan": plan,
        "readiness": readiness,
        "networkCostWarning": warning,
        "relayerUrl": relayer.as_ref().map(HttpOrderRelayer::base_url),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
