//! The approval sub-flow
//!
//! An allowance that must be reset first is granted by two transactions: a
//! reset to zero and the approval itself. The approval always takes the nonce
//! right after the reset rather than the account's pending nonce, which may
//! not yet reflect the reset.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use swap_executor_api::{
    quote::QuoteSnapshot,
    settings::SwapSettings,
    steps::StepType,
    tx::{ApproveAmount, TxIntent, UnsignedTxArtifact},
    APPROVE_RESET_AMOUNT,
};
use tracing::{info, instrument};

use super::{send::send_one, StepCompletion, StepContext};
use crate::{
    collaborators::SwapNotification,
    error::{ExecutorError, ExecutorResult},
    plan::StepPlan,
};

/// An approval transaction and what it grants
#[derive(Debug, Clone)]
pub(crate) struct PreparedApproval {
    /// The unsigned transaction
    pub artifact: UnsignedTxArtifact,
    /// The spender approved
    pub spender: String,
    /// The approved amount
    pub amount: ApproveAmount,
    /// Whether the approval resets the allowance to zero
    pub is_reset: bool,
}

impl PreparedApproval {
    /// The notification sent once the approval is submitted
    pub fn notification(&self, tx_id: Option<String>) -> SwapNotification {
        SwapNotification::ApprovalSubmitted {
            tx_id,
            spender: self.spender.clone(),
            amount: self.amount.amount.clone(),
            is_reset: self.is_reset,
        }
    }
}

/// The allowance an approval step grants
pub fn approve_amount(
    step_type: StepType,
    quote: &QuoteSnapshot,
    settings: &SwapSettings,
) -> ApproveAmount {
    if step_type == StepType::ApproveReset {
        let amount = BigDecimal::from_str(APPROVE_RESET_AMOUNT).unwrap_or_default();
        return ApproveAmount { amount, is_max: false };
    }

    ApproveAmount { amount: quote.from_amount.clone(), is_max: settings.approve_unlimited }
}

/// Pin a transaction's nonce right after the given one
pub fn chain_nonce(artifact: &mut UnsignedTxArtifact, prev_nonce: Option<u64>) {
    if let Some(prev) = prev_nonce {
        artifact.nonce = Some(prev + 1);
    }
}

/// Build an approval transaction
pub(crate) async fn prepare_approval(
    ctx: &StepContext<'_>,
    plan: &StepPlan,
    step_type: StepType,
    step_index: usize,
    prev_nonce: Option<u64>,
) -> ExecutorResult<PreparedApproval> {
    let allowance = plan
        .quote
        .allowance
        .as_ref()
        .ok_or_else(|| ExecutorError::invalid_plan("approval without an allowance requirement"))?;

    let amount = approve_amount(step_type, &plan.quote, &plan.settings);
    let intent = TxIntent::Approve {
        token: plan.quote.from_token.clone(),
        spender: allowance.allowance_target.clone(),
        amount: amount.clone(),
        prev_nonce,
    };

    let mut artifact = ctx.collaborators.builder.prepare(intent, &plan.quote, &plan.account).await?;
    artifact.step_index = step_index;
    chain_nonce(&mut artifact, prev_nonce);

    Ok(PreparedApproval {
        artifact,
        spender: allowance.allowance_target.clone(),
        amount,
        is_reset: step_type == StepType::ApproveReset,
    })
}

/// Run an `APPROVE_RESET` or `APPROVE` step
///
/// An approval that waits for confirmation, or runs under fallback, leaves the
/// plan waiting for its settlement
#[instrument(skip_all, fields(step_index = index))]
pub(crate) async fn run_approval_step(
    ctx: &StepContext<'_>,
    plan: &mut StepPlan,
    index: usize,
) -> ExecutorResult<StepCompletion> {
    let step_type = plan.steps[index].step_type;
    let prev_nonce = match step_type {
        StepType::Approve => plan.pre_swap_data.reset_nonce,
        _ => None,
    };

    let approval = prepare_approval(ctx, plan, step_type, index, prev_nonce).await?;
    plan.pre_swap_data.artifacts.insert(index, vec![approval.artifact.clone()]);

    let (signed, _) = send_one(ctx, plan, &approval.artifact).await?;
    if approval.is_reset {
        plan.pre_swap_data.reset_nonce = signed.nonce.or(approval.artifact.nonce);
    }
    info!(tx_id = %signed.tx_id, nonce = ?signed.nonce, "submitted approval");

    let awaits_settlement =
        plan.steps[index].should_wait_for_confirmation || plan.pre_swap_data.should_fallback;
    if !awaits_settlement {
        return Ok(StepCompletion::Done { tx_id: Some(signed.tx_id) });
    }

    ctx.notify(approval.notification(Some(signed.tx_id.clone()))).await;
    Ok(StepCompletion::AwaitingSettlement { tx_id: Some(signed.tx_id) })
}
