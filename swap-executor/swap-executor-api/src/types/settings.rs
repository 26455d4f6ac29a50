//! API types for user preferences and live inputs
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::gas::FeeTierPreference;

/// User preferences that shape a swap
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SwapSettings {
    /// Approve the maximum amount rather than the exact amount
    #[serde(default)]
    pub approve_unlimited: bool,
    /// Merge approval and swap into one signer interaction when possible
    #[serde(default)]
    pub batch_approve_and_swap: bool,
    /// The fee tier to pay
    #[serde(default)]
    pub fee_tier: FeeTierPreference,
    /// Whether limit orders may be filled partially
    #[serde(default)]
    pub limit_partially_fillable: bool,
    /// Overrides the configured limit order lifetime, in seconds
    #[serde(default)]
    pub limit_expiration_secs: Option<u64>,
}

/// The limit price amounts currently displayed to the user
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LimitPriceDisplay {
    /// The displayed pay amount
    #[serde(default)]
    pub pay_amount: Option<BigDecimal>,
    /// The displayed receive amount
    #[serde(default)]
    pub receive_amount: Option<BigDecimal>,
}

impl LimitPriceDisplay {
    /// Whether either amount has been entered
    pub fn is_set(&self) -> bool {
        self.pay_amount.is_some() || self.receive_amount.is_some()
    }
}
