//! The gas estimation engine
//!
//! The engine turns unsigned transactions into the single fee tier each one is
//! sent with. Estimates are cached by the structural hash of the transaction
//! body, so a step that is retried with an unchanged body never estimates
//! twice.

pub mod cache;
pub mod tiers;

use std::sync::Arc;

use itertools::Itertools;
use swap_executor_api::{
    gas::{FeeTierPreference, GasInfoCandidate, SelectedGasInfo},
    quote::{total_hop_count, QuoteSnapshot, Route},
    tx::{AccountNode, EncodedTx, SwapBuildResult, UnsignedTxArtifact},
};
use tracing::instrument;

use self::{
    cache::{CacheOrigin, GasInfoCache},
    tiers::{base_tier, select_gas},
};
use crate::{
    collaborators::GasService,
    error::{ExecutorError, ExecutorResult},
    metrics::record_gas_estimation,
};

// -------------
// | Constants |
// -------------

/// The overhead of the swap transaction itself, in basis points of the prior
/// transaction's gas limit
pub const SEND_OVERHEAD_BPS: u128 = 15_000;
/// The overhead of the allowance the swap consumes, in basis points of the
/// prior transaction's gas limit
pub const APPROVE_OVERHEAD_BPS: u128 = 10_000;
/// The number of basis points in one unit
const BPS_PER_UNIT: u128 = 10_000;

// ---------
// | Types |
// ---------

/// How a set of estimates was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateMode {
    /// Every transaction was already cached
    Cached,
    /// One request estimated every transaction
    Batched,
    /// Transactions were estimated one at a time
    Sequential,
    /// A single transaction was estimated
    Single,
}

impl EstimateMode {
    /// The metric label of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            EstimateMode::Cached => "cached",
            EstimateMode::Batched => "batched",
            EstimateMode::Sequential => "sequential",
            EstimateMode::Single => "single",
        }
    }
}

/// What the build endpoint said about the last transaction of a chain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastTxGasHint {
    /// The gas limit returned by the provider, if any
    pub gas_limit: Option<u64>,
    /// The routes of the swap
    pub routes: Vec<Route>,
}

impl LastTxGasHint {
    /// The hint for a built swap
    ///
    /// A missing or zero build limit falls back to the quote's hint, and empty
    /// build routes fall back to the quoted routes
    pub fn from_build(build: &SwapBuildResult, quote: &QuoteSnapshot) -> Self {
        let routes = if build.routes.is_empty() { &quote.routes } else { &build.routes };
        Self {
            gas_limit: build.gas_limit.filter(|limit| *limit > 0).or(quote.gas_limit_hint),
            routes: routes.clone(),
        }
    }
}

/// Synthesize the gas limit of a transaction that depends on a prior one
///
/// A direct limit from the provider wins. Otherwise the prior limit is scaled
/// by the swap and approval overheads plus one unit per route hop. The ratios
/// are a heuristic and may overestimate.
pub fn synthesize_gas_limit(base_limit: u64, hint: &LastTxGasHint) -> u64 {
    if let Some(limit) = hint.gas_limit.filter(|l| *l > 0) {
        return limit;
    }

    let overhead = SEND_OVERHEAD_BPS + APPROVE_OVERHEAD_BPS;
    let multiplier = if hint.routes.is_empty() {
        overhead
    } else {
        u128::from(total_hop_count(&hint.routes)) * BPS_PER_UNIT + overhead
    };

    let limit = u128::from(base_limit) * multiplier / BPS_PER_UNIT;
    u64::try_from(limit).unwrap_or(u64::MAX)
}

/// The gas estimation engine
///
/// The engine is the only writer of the gas cache
#[derive(Clone)]
pub struct GasEngine {
    /// The gas service
    service: Arc<dyn GasService>,
    /// The plan's gas cache
    cache: GasInfoCache,
    /// The fee tier to send with
    preference: FeeTierPreference,
    /// The origin recorded on new cache entries
    origin: CacheOrigin,
}

impl GasEngine {
    /// Constructor
    pub fn new(
        service: Arc<dyn GasService>,
        cache: GasInfoCache,
        preference: FeeTierPreference,
        origin: CacheOrigin,
    ) -> Self {
        Self { service, cache, preference, origin }
    }

    /// The cache the engine writes to
    pub fn cache(&self) -> &GasInfoCache {
        &self.cache
    }

    /// Whether the network estimates several transactions in one request
    pub async fn supports_batch(&self, network_id: &str) -> ExecutorResult<bool> {
        self.service.supports_batched_estimation(network_id).await
    }

    /// The cached estimates of every transaction, if all of them are cached
    pub fn cached_all(
        &self,
        txs: &[UnsignedTxArtifact],
        skip_preflight: bool,
    ) -> Option<Vec<SelectedGasInfo>> {
        let cached: Option<Vec<_>> =
            txs.iter().map(|tx| self.cache.get(&tx.encoded_tx, skip_preflight)).collect();
        if cached.is_some() {
            record_gas_estimation(EstimateMode::Cached.as_str());
        }
        cached
    }

    /// Estimate every transaction in one request
    ///
    /// Results are matched to transactions by position. Nothing is cached
    /// unless every transaction received an estimate
    #[instrument(skip_all, fields(network_id = %node.network_id, count = txs.len()))]
    pub async fn estimate_batch(
        &self,
        node: &AccountNode,
        txs: &[UnsignedTxArtifact],
    ) -> ExecutorResult<Vec<SelectedGasInfo>> {
        let bodies: Vec<EncodedTx> = txs.iter().map(|tx| tx.encoded_tx.clone()).collect();
        let candidates = self.service.estimate(&node.network_id, &node.account_id, &bodies).await?;
        if candidates.len() != txs.len() {
            return Err(ExecutorError::estimate(format!(
                "expected {} estimates, got {}",
                txs.len(),
                candidates.len()
            )));
        }

        let selected = candidates
            .iter()
            .map(|candidate| select_gas(candidate, self.preference))
            .collect::<ExecutorResult<Vec<_>>>()?;
        for (tx, gas) in txs.iter().zip_eq(selected.iter()) {
            self.cache.insert(&tx.encoded_tx, gas.clone(), self.origin);
        }

        record_gas_estimation(EstimateMode::Batched.as_str());
        Ok(selected)
    }

    /// Estimate a single transaction, returning the raw estimate alongside the
    /// selected tier
    #[instrument(skip_all, fields(network_id = %node.network_id))]
    pub async fn estimate_one(
        &self,
        node: &AccountNode,
        tx: &UnsignedTxArtifact,
    ) -> ExecutorResult<(GasInfoCandidate, SelectedGasInfo)> {
        let bodies = [tx.encoded_tx.clone()];
        let candidates = self.service.estimate(&node.network_id, &node.account_id, &bodies).await?;
        let candidate = candidates
            .into_iter()
            .next()
            .ok_or_else(|| ExecutorError::estimate("gas service returned no estimate"))?;

        let selected = select_gas(&candidate, self.preference)?;
        self.cache.insert(&tx.encoded_tx, selected.clone(), self.origin);
        record_gas_estimation(EstimateMode::Single.as_str());
        Ok((candidate, selected))
    }

    /// Derive the fee of the last transaction of a dependent chain from the
    /// raw estimate of the transaction before it
    pub fn synthesize_last(
        &self,
        tx: &UnsignedTxArtifact,
        prior: &GasInfoCandidate,
        hint: &LastTxGasHint,
    ) -> ExecutorResult<SelectedGasInfo> {
        let base_limit = base_tier(&prior.tiers)
            .and_then(|tier| tier.gas_limit())
            .ok_or_else(|| ExecutorError::estimate("prior estimate has no gas limit"))?;
        let limit = synthesize_gas_limit(base_limit, hint);

        let mut selected = select_gas(prior, self.preference)?;
        selected.fee = selected.fee.with_gas_limit(limit);
        self.cache.insert(&tx.encoded_tx, selected.clone(), self.origin);
        Ok(selected)
    }

    /// Estimate a dependent chain of transactions without sending any of them
    ///
    /// The last transaction of a chain estimated one at a time cannot be
    /// simulated before its prerequisites land, so its limit is synthesized
    #[instrument(skip_all, fields(network_id = %node.network_id, count = txs.len()))]
    pub async fn estimate_chain(
        &self,
        node: &AccountNode,
        txs: &[UnsignedTxArtifact],
        hint: &LastTxGasHint,
        skip_preflight: bool,
    ) -> ExecutorResult<(EstimateMode, Vec<SelectedGasInfo>)> {
        if let Some(cached) = self.cached_all(txs, skip_preflight) {
            return Ok((EstimateMode::Cached, cached));
        }

        let Some((last, prerequisites)) = txs.split_last() else {
            return Ok((EstimateMode::Cached, Vec::new()));
        };

        if prerequisites.is_empty() {
            let (_, selected) = self.estimate_one(node, last).await?;
            return Ok((EstimateMode::Single, vec![selected]));
        }

        if self.supports_batch(&node.network_id).await? {
            let selected = self.estimate_batch(node, txs).await?;
            return Ok((EstimateMode::Batched, selected));
        }

        let mut selected = Vec::with_capacity(txs.len());
        let mut prior = None;
        for tx in prerequisites {
            let (candidate, gas) = self.estimate_one(node, tx).await?;
            selected.push(gas);
            prior = Some(candidate);
        }

        let prior = prior.ok_or_else(|| ExecutorError::estimate("no prior estimate"))?;
        selected.push(self.synthesize_last(last, &prior, hint)?);
        record_gas_estimation(EstimateMode::Sequential.as_str());
        Ok((EstimateMode::Sequential, selected))
    }
}
