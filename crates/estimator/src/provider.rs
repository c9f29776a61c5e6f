use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use arc_swap::ArcSwapOption;

use crate::{EstimateError, GasEstimate};

/// Read-only access to the latest published bundle.
pub trait EstimateReader: Send + Sync {
    /// The most recent bundle, or [`EstimateError::NotReady`] before the
    /// first publication. Wait-free: a single lock-free load, no allocation.
    fn current(&self) -> Result<Arc<GasEstimate>, EstimateError>;

    /// Count of successful publications. Monotonically nondecreasing; lets
    /// consumers detect change without comparing bundle contents.
    fn update_count(&self) -> u64;
}

/// Readiness for health probes.
pub trait ReadinessChecker: Send + Sync {
    /// `true` iff [`EstimateReader::current`] would return a bundle.
    fn ready(&self) -> bool;
}

/// Single-slot, wait-free publication of the latest bundle.
///
/// The ingestion loop replaces the slot wholesale on every recomputation;
/// readers dereference the current bundle without locking. Published bundles
/// are never mutated, so readers holding an older bundle stay safe across
/// any number of later publications.
#[derive(Debug, Default)]
pub struct EstimateProvider {
    current: ArcSwapOption<GasEstimate>,
    updates: AtomicU64,
}

impl EstimateProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replaces the published bundle and bumps the counter.
    pub fn update(&self, estimate: GasEstimate) {
        self.current.store(Some(Arc::new(estimate)));
        self.updates.fetch_add(1, Ordering::Release);
    }
}

impl EstimateReader for EstimateProvider {
    fn current(&self) -> Result<Arc<GasEstimate>, EstimateError> {
        self.current.load_full().ok_or(EstimateError::NotReady)
    }

    fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Acquire)
    }
}

impl ReadinessChecker for EstimateProvider {
    fn ready(&self) -> bool {
        self.current.load().is_some()
    }
}
