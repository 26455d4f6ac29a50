//! API types for the step plan observed by the UI layer
use serde::{Deserialize, Serialize};

// ---------
// | Types |
// ---------

/// How approval and swap signer interactions are grouped
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchTransferType {
    /// One signer interaction per step
    #[default]
    Normal,
    /// Approvals and swap are estimated and sent as one logical unit
    BatchApproveAndSend,
    /// Approvals and swap are sent back-to-back through consecutive prompts
    ContinuousApproveAndSend,
}

impl BatchTransferType {
    /// Whether approvals and swap are merged into a single plan step
    pub fn is_merged(&self) -> bool {
        !matches!(self, BatchTransferType::Normal)
    }
}

/// The kind of operation a step performs
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    /// Reset an existing allowance to zero
    ApproveReset,
    /// Grant the allowance the swap needs
    Approve,
    /// Convert between the native asset and its wrapped token
    Wrap,
    /// Send the swap transaction
    Send,
    /// Sign an off-chain order and hand it to the relayer
    SignMessage,
    /// Send approvals and the swap as one unit
    BatchApproveAndSend,
}

impl StepType {
    /// Whether the step grants or resets an allowance
    pub fn is_approve(&self) -> bool {
        matches!(self, StepType::ApproveReset | StepType::Approve)
    }

    /// A stable label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::ApproveReset => "approve_reset",
            StepType::Approve => "approve",
            StepType::Wrap => "wrap",
            StepType::Send => "send",
            StepType::SignMessage => "sign_message",
            StepType::BatchApproveAndSend => "batch_approve_and_send",
        }
    }
}

/// The progress of a single step
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// Waiting to run
    Ready,
    /// Running
    Loading,
    /// Submitted, settlement is awaited elsewhere
    Pending,
    /// Done
    Success,
    /// Stopped with an error
    Failed,
}

/// A single typed, stateful operation of a step plan
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SwapStep {
    /// The operation the step performs
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// The step's progress
    pub status: StepStatus,
    /// Whether a failed step may be run again
    pub can_retry: bool,
    /// The transaction the step submitted
    pub tx_hash: Option<String>,
    /// The order the step placed
    pub order_id: Option<String>,
    /// The error that stopped the step
    pub error_message: Option<String>,
    /// Whether the plan waits for the step to settle before continuing
    pub should_wait_for_confirmation: bool,
}

impl SwapStep {
    /// Create a ready step of the given type
    ///
    /// Approval steps can be retried and wait for their allowance to settle
    pub fn new(step_type: StepType) -> Self {
        let is_approve = step_type.is_approve();
        Self {
            step_type,
            status: StepStatus::Ready,
            can_retry: is_approve,
            tx_hash: None,
            order_id: None,
            error_message: None,
            should_wait_for_confirmation: is_approve,
        }
    }

    /// Whether the executor may run the step on its next pass
    pub fn is_runnable(&self) -> bool {
        match self.status {
            StepStatus::Ready => true,
            StepStatus::Failed => self.can_retry,
            _ => false,
        }
    }
}
