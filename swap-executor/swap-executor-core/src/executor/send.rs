//! Building and sending swap, wrap and batched transactions

use std::slice;

use swap_executor_api::{
    gas::SelectedGasInfo,
    steps::StepType,
    tx::{EncodedTx, SignedTx, SwapBuildResult, TxIntent, UnsignedTxArtifact, WrapDirection},
};
use tracing::{debug, info, instrument};

use super::{
    approval::{chain_nonce, prepare_approval, PreparedApproval},
    StepCompletion, StepContext,
};
use crate::{
    error::{ExecutorError, ExecutorResult},
    gas::LastTxGasHint,
    orders::{now_secs, sign_and_submit_order, OrderInputs},
    plan::StepPlan,
};

/// A broadcast transaction and the fee it was sent with
///
/// The fee is absent when the user set it on a confirmation screen
pub(crate) type SentTx = (SignedTx, Option<SelectedGasInfo>);

// -----------
// | Sending |
// -----------

/// Send transactions after explicit user confirmation
async fn confirm_and_send(
    ctx: &StepContext<'_>,
    plan: &StepPlan,
    txs: &[UnsignedTxArtifact],
) -> ExecutorResult<Vec<SentTx>> {
    let signed = ctx.collaborators.signer.confirm_and_send(&plan.account, txs).await?;
    if signed.len() != txs.len() {
        return Err(ExecutorError::send(format!(
            "confirmed {} of {} transactions",
            signed.len(),
            txs.len()
        )));
    }

    Ok(signed.into_iter().map(|tx| (tx, None)).collect())
}

/// Send a single transaction
pub(crate) async fn send_one(
    ctx: &StepContext<'_>,
    plan: &StepPlan,
    tx: &UnsignedTxArtifact,
) -> ExecutorResult<SentTx> {
    let mut sent = send_chain(ctx, plan, slice::from_ref(tx), &LastTxGasHint::default()).await?;
    sent.pop().ok_or_else(|| ExecutorError::send("no transaction was sent"))
}

/// Send a dependent chain of transactions in order
///
/// Under fallback the whole chain goes through a confirmation screen.
/// Otherwise fees come from the cache, one batched estimate, or one estimate
/// per prerequisite sent before the next is estimated
#[instrument(skip_all, fields(count = txs.len(), fallback = plan.pre_swap_data.should_fallback))]
pub(crate) async fn send_chain(
    ctx: &StepContext<'_>,
    plan: &StepPlan,
    txs: &[UnsignedTxArtifact],
    hint: &LastTxGasHint,
) -> ExecutorResult<Vec<SentTx>> {
    if plan.pre_swap_data.should_fallback {
        return confirm_and_send(ctx, plan, txs).await;
    }

    let skip_preflight = plan.pre_swap_data.need_fetch_gas;
    let node = &plan.account;

    // A chain estimated one at a time is re-estimated as each prerequisite
    // lands, so only single transactions and batched chains reuse the cache
    let batched = txs.len() > 1 && ctx.gas.supports_batch(&node.network_id).await?;
    if txs.len() > 1 && !batched {
        return send_sequential(ctx, plan, txs, hint).await;
    }

    let gas = if let Some(cached) = ctx.gas.cached_all(txs, skip_preflight) {
        debug!("using cached gas estimates");
        cached
    } else if batched {
        ctx.gas.estimate_batch(node, txs).await?
    } else {
        let tx = txs.first().ok_or_else(|| ExecutorError::invalid_plan("empty chain"))?;
        let (_, selected) = ctx.gas.estimate_one(node, tx).await?;
        vec![selected]
    };

    let mut sent = Vec::with_capacity(txs.len());
    for (tx, gas) in txs.iter().zip(gas) {
        let signed = ctx.collaborators.signer.sign_and_send(node, tx, &gas).await?;
        sent.push((signed, Some(gas)));
    }
    Ok(sent)
}

/// Estimate and send a chain one transaction at a time
///
/// The last transaction cannot be simulated until its prerequisites land, so
/// its gas limit is synthesized from the estimate of the one before it
async fn send_sequential(
    ctx: &StepContext<'_>,
    plan: &StepPlan,
    txs: &[UnsignedTxArtifact],
    hint: &LastTxGasHint,
) -> ExecutorResult<Vec<SentTx>> {
    let (last, prerequisites) =
        txs.split_last().ok_or_else(|| ExecutorError::invalid_plan("empty transaction chain"))?;

    let node = &plan.account;
    let mut sent = Vec::with_capacity(txs.len());
    let mut prior = None;
    for tx in prerequisites {
        let (candidate, gas) = ctx.gas.estimate_one(node, tx).await?;
        let signed = ctx.collaborators.signer.sign_and_send(node, tx, &gas).await?;
        debug!(tx_id = %signed.tx_id, "sent prerequisite transaction");

        sent.push((signed, Some(gas)));
        prior = Some(candidate);
    }

    let prior = prior.ok_or_else(|| ExecutorError::estimate("no prior estimate"))?;
    let gas = ctx.gas.synthesize_last(last, &prior, hint)?;
    let signed = ctx.collaborators.signer.sign_and_send(node, last, &gas).await?;
    sent.push((signed, Some(gas)));
    Ok(sent)
}

// ------------
// | Building |
// ------------

/// Ask the provider to build the swap, applying fallbacks from the quote
///
/// A missing or zero gas limit falls back to the quote's hint, as do empty
/// routes. The receive amount of the plan follows the build
pub(crate) async fn build_swap(
    ctx: &StepContext<'_>,
    plan: &mut StepPlan,
) -> ExecutorResult<(SwapBuildResult, LastTxGasHint)> {
    let mut build = ctx
        .collaborators
        .builder
        .build_swap(&plan.quote, &plan.account, &plan.receiving_address)
        .await?;

    if build.routes.is_empty() {
        build.routes = plan.quote.routes.clone();
    }
    if let Some(to_amount) = &build.to_amount {
        plan.pre_swap_data.to_token_amount = to_amount.clone();
    }
    build.swap_info.to_amount = plan.pre_swap_data.to_token_amount.clone();
    if build.swap_info.order_id.is_none() {
        build.swap_info.order_id = build.order_id.clone();
    }

    let hint = LastTxGasHint::from_build(&build, &plan.quote);
    Ok((build, hint))
}

/// Turn a built swap body into an unsigned transaction
pub(crate) async fn prepare_swap(
    ctx: &StepContext<'_>,
    plan: &StepPlan,
    encoded_tx: EncodedTx,
    step_index: usize,
    prev_nonce: Option<u64>,
) -> ExecutorResult<UnsignedTxArtifact> {
    let intent = TxIntent::Swap { encoded_tx, prev_nonce };
    let mut artifact = ctx.collaborators.builder.prepare(intent, &plan.quote, &plan.account).await?;
    artifact.step_index = step_index;
    chain_nonce(&mut artifact, prev_nonce);
    Ok(artifact)
}

/// The transaction body of a build that must be sent
fn encoded_swap(build: &SwapBuildResult) -> ExecutorResult<EncodedTx> {
    build
        .encoded_tx
        .clone()
        .ok_or_else(|| ExecutorError::build_api("build returned no transaction"))
}

/// The order id of a build that placed an order instead of returning a body
fn placed_order_id(build: &SwapBuildResult) -> ExecutorResult<String> {
    build
        .order_id
        .clone()
        .ok_or_else(|| ExecutorError::build_api("build skipped send without an order"))
}

// ---------
// | Steps |
// ---------

/// Run a `SEND` step
#[instrument(skip_all, fields(step_index = index))]
pub(crate) async fn run_send_step(
    ctx: &StepContext<'_>,
    plan: &mut StepPlan,
    index: usize,
) -> ExecutorResult<StepCompletion> {
    let (build, _) = build_swap(ctx, plan).await?;
    if build.skip_send {
        let order_id = placed_order_id(&build)?;
        info!(%order_id, "provider accepted the swap as an order");
        return Ok(StepCompletion::OrderPlaced { order_id, swap_info: build.swap_info });
    }

    let artifact = prepare_swap(ctx, plan, encoded_swap(&build)?, index, None).await?;
    plan.pre_swap_data.artifacts.insert(index, vec![artifact.clone()]);

    let (signed, gas) = send_one(ctx, plan, &artifact).await?;
    info!(tx_id = %signed.tx_id, "sent swap");
    Ok(StepCompletion::Sent { tx_id: signed.tx_id, gas, swap_info: build.swap_info })
}

/// Run a `WRAP` step
#[instrument(skip_all, fields(step_index = index))]
pub(crate) async fn run_wrap_step(
    ctx: &StepContext<'_>,
    plan: &mut StepPlan,
    index: usize,
) -> ExecutorResult<StepCompletion> {
    let quote = &plan.quote;
    let (direction, contract) = if quote.from_token.is_native {
        (WrapDirection::Deposit, quote.to_token.contract_address.clone())
    } else {
        (WrapDirection::Withdraw, quote.from_token.contract_address.clone())
    };

    let intent = TxIntent::Wrap { direction, contract, amount: quote.from_amount.clone() };
    let mut artifact = ctx.collaborators.builder.prepare(intent, quote, &plan.account).await?;
    artifact.step_index = index;
    plan.pre_swap_data.artifacts.insert(index, vec![artifact.clone()]);

    let (signed, gas) = send_one(ctx, plan, &artifact).await?;
    info!(tx_id = %signed.tx_id, ?direction, "sent wrap");
    Ok(StepCompletion::Sent { tx_id: signed.tx_id, gas, swap_info: plan.swap_info(None) })
}

/// Run a `SIGN_MESSAGE` step
#[instrument(skip_all, fields(step_index = index))]
pub(crate) async fn run_sign_message_step(
    ctx: &StepContext<'_>,
    plan: &mut StepPlan,
    index: usize,
) -> ExecutorResult<StepCompletion> {
    let expiration_secs =
        plan.settings.limit_expiration_secs.unwrap_or(ctx.config.limit_expiration.as_secs());
    let inputs = OrderInputs {
        quote: &plan.quote,
        receiving_address: &plan.receiving_address,
        settings: &plan.settings,
        limit_price: &plan.limit_price,
        expiration_secs,
        now_secs: now_secs(),
    };

    let signer = ctx.collaborators.signer.as_ref();
    let relayer = ctx.collaborators.relayer.as_ref();
    let (_, placed) = sign_and_submit_order(signer, relayer, &plan.account, &inputs).await?;

    let swap_info = plan.swap_info(Some(placed.order_id.clone()));
    Ok(StepCompletion::OrderPlaced { order_id: placed.order_id, swap_info })
}

/// Run a `BATCH_APPROVE_AND_SEND` step
///
/// The approvals and the swap are built with chained nonces and sent back to
/// back without waiting for the approvals to settle
#[instrument(
    skip_all,
    fields(step_index = index, batch_type = ?plan.pre_swap_data.batch_transfer_type)
)]
pub(crate) async fn run_batch_step(
    ctx: &StepContext<'_>,
    plan: &mut StepPlan,
    index: usize,
) -> ExecutorResult<StepCompletion> {
    let (build, hint) = build_swap(ctx, plan).await?;

    let mut approvals: Vec<PreparedApproval> = Vec::new();
    if plan.quote.should_reset_approve() {
        approvals.push(prepare_approval(ctx, plan, StepType::ApproveReset, index, None).await?);
    }
    let prev_nonce = approvals.last().and_then(|a| a.artifact.nonce);
    approvals.push(prepare_approval(ctx, plan, StepType::Approve, index, prev_nonce).await?);

    let mut txs: Vec<UnsignedTxArtifact> = approvals.iter().map(|a| a.artifact.clone()).collect();
    if !build.skip_send {
        let prev_nonce = txs.last().and_then(|tx| tx.nonce);
        txs.push(prepare_swap(ctx, plan, encoded_swap(&build)?, index, prev_nonce).await?);
    }
    plan.pre_swap_data.artifacts.insert(index, txs.clone());

    let mut sent = send_chain(ctx, plan, &txs, &hint).await?;
    for (approval, (signed, _)) in approvals.iter().zip(sent.iter()) {
        ctx.notify(approval.notification(Some(signed.tx_id.clone()))).await;
    }

    if build.skip_send {
        let order_id = placed_order_id(&build)?;
        return Ok(StepCompletion::OrderPlaced { order_id, swap_info: build.swap_info });
    }

    let (signed, gas) = sent.pop().ok_or_else(|| ExecutorError::send("no swap was sent"))?;
    info!(tx_id = %signed.tx_id, count = txs.len(), "sent batched approval and swap");
    Ok(StepCompletion::Sent { tx_id: signed.tx_id, gas, swap_info: build.swap_info })
}
