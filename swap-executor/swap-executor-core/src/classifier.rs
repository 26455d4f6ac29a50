//! Decides how approval and swap signer interactions are grouped

use swap_executor_api::{steps::BatchTransferType, tx::AccountKind};
use tracing::debug;

use crate::cli::ExecutorConfig;

/// The inputs of a batch transfer classification
#[derive(Debug, Clone)]
pub struct ClassifierInput<'a> {
    /// The network the swap is sent on
    pub network_id: &'a str,
    /// The signing capability of the paying account
    pub account_kind: AccountKind,
    /// Whether the provider forbids merging approval and swap
    pub provider_disables_batching: bool,
    /// Whether the order settles through an off-chain signature
    pub requires_offchain_signature: bool,
    /// Whether an allowance must be granted first
    pub needs_approval: bool,
    /// Whether the user prefers merging approval and swap
    pub user_batch_preference: bool,
}

/// Classify how the swap's signer interactions are grouped
///
/// Hardware, QR and external accounts cannot batch at the RPC level and are
/// driven through consecutive prompts instead. Provider or network
/// incompatibility, a disabled preference and off-chain signed orders always
/// force `Normal`.
pub fn classify(input: &ClassifierInput<'_>, config: &ExecutorConfig) -> BatchTransferType {
    let mut batch_type = BatchTransferType::Normal;
    if input.user_batch_preference && input.needs_approval {
        batch_type = BatchTransferType::BatchApproveAndSend;
    }

    if input.account_kind.signs_every_time() && input.needs_approval {
        batch_type = BatchTransferType::ContinuousApproveAndSend;
    }

    let network_unsupported = config.batch_unsupported(input.network_id);
    if input.provider_disables_batching
        || network_unsupported
        || !input.user_batch_preference
        || input.requires_offchain_signature
    {
        batch_type = BatchTransferType::Normal;
    }

    debug!(network_id = input.network_id, ?batch_type, "classified batch transfer");
    batch_type
}
