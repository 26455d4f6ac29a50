//! API types for fee estimates
//!
//! A fee estimate is a list of tiers (low / average / high) of a single chain
//! family. Callers never inspect chain-specific fields directly; they go
//! through the accessors on [`FeeCandidate`].
use std::str::FromStr;

use alloy_primitives::U256;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::serialization::{option_u256_string_serialization, u256_string_serialization};

// -------------
// | Constants |
// -------------

/// The number of micro-lamports in a lamport
const MICRO_LAMPORTS_PER_LAMPORT: u64 = 1_000_000;

// ---------
// | Types |
// ---------

/// The fee tier a user prefers
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeeTierPreference {
    /// The cheapest tier
    Low,
    /// The middle tier
    #[default]
    Average,
    /// The fastest tier
    High,
}

/// Fee information shared by every tier of an estimate
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeeCommon {
    /// The symbol of the token fees are paid in
    pub fee_symbol: String,
    /// The decimals of the fee token
    pub fee_decimals: u8,
    /// The fiat price of the native token
    pub native_token_price: BigDecimal,
    /// The current base fee, for chains that have one
    #[serde(default, with = "option_u256_string_serialization")]
    pub base_fee: Option<U256>,
}

/// The chain families that charge a flat per-transaction fee
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlatFeeFamily {
    /// Nervos CKB
    Ckb,
    /// Algorand
    Algo,
    /// Polkadot
    Dot,
    /// Sui
    Sui,
}

/// A single fee tier, one variant per chain family
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "family", rename_all = "camelCase")]
pub enum FeeCandidate {
    /// EVM legacy gas pricing
    #[serde(rename_all = "camelCase")]
    EvmLegacy {
        /// The gas price, in wei
        #[serde(with = "u256_string_serialization")]
        gas_price: U256,
        /// The gas limit
        gas_limit: u64,
    },
    /// EVM EIP-1559 gas pricing
    #[serde(rename_all = "camelCase")]
    Eip1559 {
        /// The maximum fee per gas, in wei
        #[serde(with = "u256_string_serialization")]
        max_fee_per_gas: U256,
        /// The maximum priority fee per gas, in wei
        #[serde(with = "u256_string_serialization")]
        max_priority_fee_per_gas: U256,
        /// The gas limit
        gas_limit: u64,
    },
    /// UTXO fee-rate pricing
    #[serde(rename_all = "camelCase")]
    Utxo {
        /// The fee rate, in satoshis per virtual byte
        fee_rate: u64,
        /// The estimated transaction size, in virtual bytes
        tx_size: u64,
    },
    /// Tron resource pricing
    #[serde(rename_all = "camelCase")]
    Tron {
        /// The energy the transaction consumes
        energy: u64,
        /// The bandwidth the transaction consumes
        bandwidth: u64,
        /// The maximum fee burned, in sun
        #[serde(with = "u256_string_serialization")]
        fee_limit: U256,
    },
    /// Solana compute-unit pricing
    #[serde(rename_all = "camelCase")]
    Solana {
        /// The base signature fee, in lamports
        base_fee: u64,
        /// The compute unit price, in micro-lamports
        compute_unit_price: u64,
        /// The compute unit limit
        compute_unit_limit: u64,
    },
    /// A flat per-transaction fee
    #[serde(rename_all = "camelCase")]
    Flat {
        /// The chain family charging the fee
        chain: FlatFeeFamily,
        /// The fee, in the fee token's atoms
        #[serde(with = "u256_string_serialization")]
        fee: U256,
    },
}

impl FeeCandidate {
    /// Whether the candidate uses EVM gas pricing
    pub fn is_evm(&self) -> bool {
        matches!(self, FeeCandidate::EvmLegacy { .. } | FeeCandidate::Eip1559 { .. })
    }

    /// The gas limit, for families that have one
    pub fn gas_limit(&self) -> Option<u64> {
        match self {
            FeeCandidate::EvmLegacy { gas_limit, .. } | FeeCandidate::Eip1559 { gas_limit, .. } => {
                Some(*gas_limit)
            },
            _ => None,
        }
    }

    /// A copy of the candidate with its gas limit replaced
    ///
    /// Families without a gas limit are returned unchanged
    pub fn with_gas_limit(&self, limit: u64) -> Self {
        let mut candidate = self.clone();
        match &mut candidate {
            FeeCandidate::EvmLegacy { gas_limit, .. } | FeeCandidate::Eip1559 { gas_limit, .. } => {
                *gas_limit = limit;
            },
            _ => {},
        }
        candidate
    }

    /// The maximum fee the candidate pays, in the fee token's atoms
    pub fn max_fee_atoms(&self) -> U256 {
        match self {
            FeeCandidate::EvmLegacy { gas_price, gas_limit } => {
                *gas_price * U256::from(*gas_limit)
            },
            FeeCandidate::Eip1559 { max_fee_per_gas, gas_limit, .. } => {
                *max_fee_per_gas * U256::from(*gas_limit)
            },
            FeeCandidate::Utxo { fee_rate, tx_size } => {
                U256::from(*fee_rate) * U256::from(*tx_size)
            },
            FeeCandidate::Tron { fee_limit, .. } => *fee_limit,
            FeeCandidate::Solana { base_fee, compute_unit_price, compute_unit_limit } => {
                let priority = U256::from(*compute_unit_price) * U256::from(*compute_unit_limit)
                    / U256::from(MICRO_LAMPORTS_PER_LAMPORT);
                U256::from(*base_fee) + priority
            },
            FeeCandidate::Flat { fee, .. } => *fee,
        }
    }
}

/// The fee estimate for one transaction, as returned by the gas service
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GasInfoCandidate {
    /// Information shared by every tier
    pub common: FeeCommon,
    /// The tiers, ordered low to high
    pub tiers: Vec<FeeCandidate>,
}

/// The single tier chosen to send a transaction with
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectedGasInfo {
    /// Information shared by every tier
    pub common: FeeCommon,
    /// The chosen tier
    pub fee: FeeCandidate,
}

impl SelectedGasInfo {
    /// The maximum fee in units of the fee token
    pub fn native_fee(&self) -> BigDecimal {
        let atoms = BigDecimal::from_str(&self.fee.max_fee_atoms().to_string())
            .unwrap_or_else(|_| BigDecimal::from(0));
        let scale = BigDecimal::new(1.into(), -i64::from(self.common.fee_decimals));
        atoms / scale
    }

    /// The maximum fee in fiat
    pub fn fiat_fee(&self) -> BigDecimal {
        self.native_fee() * &self.common.native_token_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A fee common block for an 18 decimal token
    fn common(price: u64) -> FeeCommon {
        FeeCommon {
            fee_symbol: "ETH".to_string(),
            fee_decimals: 18,
            native_token_price: BigDecimal::from(price),
            base_fee: None,
        }
    }

    /// Test that gas limits are only reported and replaced for EVM candidates
    #[test]
    fn test_gas_limit_accessors() {
        let evm = FeeCandidate::EvmLegacy { gas_price: U256::from(10u64), gas_limit: 21_000 };
        assert!(evm.is_evm());
        assert_eq!(evm.with_gas_limit(50_000).gas_limit(), Some(50_000));

        let utxo = FeeCandidate::Utxo { fee_rate: 5, tx_size: 200 };
        assert!(!utxo.is_evm());
        assert_eq!(utxo.gas_limit(), None);
        assert_eq!(utxo.with_gas_limit(50_000), utxo);
    }

    /// Test the maximum fee of each family
    #[test]
    fn test_max_fee_atoms() {
        let eip1559 = FeeCandidate::Eip1559 {
            max_fee_per_gas: U256::from(3u64),
            max_priority_fee_per_gas: U256::from(1u64),
            gas_limit: 100,
        };
        assert_eq!(eip1559.max_fee_atoms(), U256::from(300u64));

        let sol = FeeCandidate::Solana {
            base_fee: 5_000,
            compute_unit_price: 2_000_000,
            compute_unit_limit: 10,
        };
        assert_eq!(sol.max_fee_atoms(), U256::from(5_020u64));
    }

    /// Test conversion of a fee to native units and fiat
    #[test]
    fn test_native_and_fiat_fee() {
        let fee = FeeCandidate::EvmLegacy {
            gas_price: U256::from(1_000_000_000u64),
            gas_limit: 1_000_000,
        };
        let selected = SelectedGasInfo { common: common(2_000), fee };

        assert_eq!(selected.native_fee(), BigDecimal::from_str("0.001").unwrap());
        assert_eq!(selected.fiat_fee(), BigDecimal::from(2));
    }

    /// Test that the family tag is written on the wire
    #[test]
    fn test_candidate_wire_format() {
        let fee = FeeCandidate::Flat { chain: FlatFeeFamily::Sui, fee: U256::from(9u64) };
        let value = serde_json::to_value(&fee).unwrap();
        assert_eq!(value["family"], "flat");
        assert_eq!(value["chain"], "sui");
        assert_eq!(value["fee"], "9");
    }
}
