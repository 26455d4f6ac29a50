//! A cache of fee estimates keyed by the structural hash of the transaction
//! body
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
};

use alloy_primitives::B256;
use swap_executor_api::{gas::SelectedGasInfo, tx::EncodedTx};

/// Where a cached estimate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOrigin {
    /// Estimated before the plan started running
    Preflight,
    /// Estimated while executing a step
    Execution,
}

/// A cached estimate
#[derive(Debug, Clone)]
struct CacheEntry {
    /// The estimate
    gas: SelectedGasInfo,
    /// Where the estimate came from
    origin: CacheOrigin,
}

/// A value-type handle to the gas cache. Clones are cheap and share state.
///
/// Only the gas engine writes to the cache
#[derive(Clone, Default)]
pub struct GasInfoCache(Arc<RwLock<HashMap<B256, CacheEntry>>>);

impl fmt::Debug for GasInfoCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GasInfoCache").field("entries", &self.len()).finish()
    }
}

impl GasInfoCache {
    /// Look up the estimate for a transaction body
    ///
    /// Estimates made before the plan started are skipped when
    /// `skip_preflight` is set
    pub fn get(&self, tx: &EncodedTx, skip_preflight: bool) -> Option<SelectedGasInfo> {
        let key = tx.structural_hash();
        let entries = self.0.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&key)
            .filter(|entry| !(skip_preflight && entry.origin == CacheOrigin::Preflight))
            .map(|entry| entry.gas.clone())
    }

    /// The number of cached estimates
    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store the estimate for a transaction body
    pub(crate) fn insert(&self, tx: &EncodedTx, gas: SelectedGasInfo, origin: CacheOrigin) {
        let key = tx.structural_hash();
        let mut entries = self.0.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, CacheEntry { gas, origin });
    }
}
