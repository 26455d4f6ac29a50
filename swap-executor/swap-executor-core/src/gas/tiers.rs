//! Fee tier selection

use swap_executor_api::gas::{FeeCandidate, FeeTierPreference, GasInfoCandidate, SelectedGasInfo};

use crate::error::{ExecutorError, ExecutorResult};

/// Pick the tier to send with
///
/// Non-EVM families only estimate a single meaningful tier, so they always use
/// the first one
pub fn select_tier(tiers: &[FeeCandidate], preference: FeeTierPreference) -> Option<&FeeCandidate> {
    let first = tiers.first()?;
    if !first.is_evm() {
        return Some(first);
    }

    match preference {
        FeeTierPreference::Low => Some(first),
        FeeTierPreference::Average => tiers.get(1).or(Some(first)),
        FeeTierPreference::High => tiers.get(2).or_else(|| tiers.get(1)).or(Some(first)),
    }
}

/// The tier whose gas limit seeds the limit of a dependent transaction
pub fn base_tier(tiers: &[FeeCandidate]) -> Option<&FeeCandidate> {
    tiers.get(1).or_else(|| tiers.first())
}

/// Reduce an estimate to the tier to send with
pub fn select_gas(
    candidate: &GasInfoCandidate,
    preference: FeeTierPreference,
) -> ExecutorResult<SelectedGasInfo> {
    let fee = select_tier(&candidate.tiers, preference)
        .ok_or_else(|| ExecutorError::estimate("fee estimate has no tiers"))?;
    Ok(SelectedGasInfo { common: candidate.common.clone(), fee: fee.clone() })
}
