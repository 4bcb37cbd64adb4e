use futures_util::future::join_all;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::cache::SharedCache;
use crate::dispatcher::{Admission, BatchDispatcher, DEFAULT_UPSTREAM_TIMEOUT};
use crate::error::AnalysisError;
use crate::fallback;
use crate::metrics::REQUEST_TOTAL;
use crate::models::{AnalysisRequest, Priority, ProductSignature, Submission};
use crate::upstream::InferenceBackend;

/// Most products accepted by one batch submission.
pub const MAX_BATCH_ITEMS: usize = 10;

/// Reject empty batches and batches over MAX_BATCH_ITEMS.
pub fn check_batch_len(count: usize) -> Result<(), AnalysisError> {
    if count == 0 {
        return Err(AnalysisError::InvalidRequest(
            "products must be a non-empty array".to_string(),
        ));
    }
    if count > MAX_BATCH_ITEMS {
        return Err(AnalysisError::TooManyItems {
            count,
            limit: MAX_BATCH_ITEMS,
        });
    }
    Ok(())
}

/// Supervisor slot plus how many times that slot has been respawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId {
    pub slot: usize,
    pub generation: u64,
}

impl WorkerId {
    pub fn new(slot: usize) -> Self {
        Self { slot, generation: 0 }
    }

    pub fn respawned(self) -> Self {
        Self {
            slot: self.slot,
            generation: self.generation + 1,
        }
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}.{}", self.slot, self.generation)
    }
}

#[derive(Debug, Default)]
pub struct WorkerStats {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    upstream_successes: AtomicU64,
    fallbacks: AtomicU64,
    dispatch_cycles: AtomicU64,
}

impl WorkerStats {
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream(&self) {
        self.upstream_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle(&self) {
        self.dispatch_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            upstream_successes: self.upstream_successes.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            dispatch_cycles: self.dispatch_cycles.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub requests: u64,
    pub cache_hits: u64,
    pub upstream_successes: u64,
    pub fallbacks: u64,
    pub dispatch_cycles: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub upstream_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }
}


#[derive(Debug)]
pub struct BatchOutcome {
    pub product: ProductSignature,
    pub outcome: Result<Submission, AnalysisError>,
}

/// One schedulable unit: owns its queue and dispatcher and shares only the
/// cache with sibling workers.
pub struct Worker {
    id: WorkerId,
    started_at: Instant,
    cache: SharedCache,
    dispatcher: Arc<BatchDispatcher>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        cache: SharedCache,
        upstream: Arc<dyn InferenceBackend>,
        settings: WorkerSettings,
    ) -> Self {
        let stats = Arc::new(WorkerStats::default());
        let dispatcher = BatchDispatcher::new(
            id,
            cache.clone(),
            upstream,
            settings.upstream_timeout,
            Arc::clone(&stats),
        );
        Self {
            id,
            started_at: Instant::now(),
            cache,
            dispatcher: Arc::new(dispatcher),
            stats,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn queue_len(&self) -> usize {
        self.dispatcher.queue_len()
    }

    pub fn active_batches(&self) -> usize {
        self.dispatcher.active_batches()
    }

    pub fn pending_keys(&self) -> usize {
        self.dispatcher.pending().len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Resolve one product. Only malformed input is an error; any downstream
    /// failure resolves to a fallback estimate.
    pub async fn submit(
        &self,
        signature: &ProductSignature,
        priority: Priority,
    ) -> Result<Submission, AnalysisError> {
        REQUEST_TOTAL.inc();
        self.stats.record_request();
        let signature = signature.validate()?;
        let key = self.cache.key_for(&signature);

        if let Some(result) = self.cache.lookup(&key).await {
            self.stats.record_cache_hit();
            return Ok(Submission {
                result,
                cached: true,
            });
        }

        let handle = match self.dispatcher.pending().admit(&key) {
            Admission::Follower(rx) => {
                if priority == Priority::High {
                    self.dispatcher.promote(&key);
                }
                rx
            }
            Admission::Leader => {
                let (request, rx) = AnalysisRequest::new(signature.clone(), key, priority);
                self.dispatcher.enqueue(request);
                self.dispatcher.trigger();
                rx
            }
        };

        match handle.await {
            Ok(submission) => Ok(submission),
            Err(_) => {
                warn!(worker = %self.id, "request dropped before resolution, serving fallback estimate");
                self.stats.record_fallback();
                Ok(Submission {
                    result: fallback::estimate(&signature).with_worker(self.id),
                    cached: false,
                })
            }
        }
    }

    /// Submit up to MAX_BATCH_ITEMS products concurrently. Per-item failures
    /// are reported in place.
    pub async fn submit_batch(
        &self,
        products: Vec<ProductSignature>,
    ) -> Result<Vec<BatchOutcome>, AnalysisError> {
        check_batch_len(products.len())?;

        let outcomes =
            join_all(products.iter().map(|p| self.submit(p, Priority::Normal))).await;
        Ok(products
            .into_iter()
            .zip(outcomes)
            .map(|(product, outcome)| BatchOutcome { product, outcome })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_id_display_and_respawn() {
        let id = WorkerId::new(3);
        assert_eq!(id.to_string(), "w3.0");
        assert_eq!(id.respawned().respawned().to_string(), "w3.2");
    }

    #[test]
    fn batch_length_bounds() {
        assert!(matches!(
            check_batch_len(0),
            Err(AnalysisError::InvalidRequest(_))
        ));
        assert_eq!(check_batch_len(MAX_BATCH_ITEMS), Ok(()));
        assert_eq!(
            check_batch_len(12),
            Err(AnalysisError::TooManyItems { count: 12, limit: 10 })
        );
    }

    #[test]
    fn stats_snapshot_counts() {
        let stats = WorkerStats::default();
        stats.record_request();
        stats.record_request();
        stats.record_fallback();
        let snap = stats.snapshot();
        assert_eq!(snap.requests, 2);
        assert_eq!(snap.fallbacks, 1);
        assert_eq!(snap.cache_hits, 0);
    }
}
