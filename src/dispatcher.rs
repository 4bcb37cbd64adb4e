use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::cache::{CacheKey, SharedCache};
use crate::error::UpstreamError;
use crate::fallback;
use crate::metrics::{
    BATCH_SIZE, FALLBACKS, QUEUE_DEPTH, REQUEST_LATENCY, UPSTREAM_CALLS, UPSTREAM_FAILURES,
};
use crate::models::{AnalysisRequest, AnalysisResult, ProductSignature, Submission};
use crate::prompt::{build_prompt, parse_report};
use crate::queue::PriorityQueue;
use crate::upstream::InferenceBackend;
use crate::worker::{WorkerId, WorkerStats};

/// Most requests a single cycle sends upstream at once.
pub const MAX_BATCH_SIZE: usize = 5;

pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

pub enum Admission {
    /// First submitter for the key; must enqueue a request.
    Leader,
    /// Key is already queued or in flight; wait for its result.
    Follower(oneshot::Receiver<Submission>),
}

/// Keys queued or in flight on this worker, with the callers waiting on them.
#[derive(Default)]
pub struct PendingTable {
    waiters: DashMap<CacheKey, Vec<oneshot::Sender<Submission>>>,
}

impl PendingTable {
    pub fn admit(&self, key: &CacheKey) -> Admission {
        match self.waiters.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let (tx, rx) = oneshot::channel();
                entry.get_mut().push(tx);
                Admission::Follower(rx)
            }
            Entry::Vacant(entry) => {
                entry.insert(Vec::new());
                Admission::Leader
            }
        }
    }

    fn complete(&self, key: &CacheKey, submission: &Submission) {
        if let Some((_, waiters)) = self.waiters.remove(key) {
            for tx in waiters {
                let _ = tx.send(submission.clone());
            }
        }
    }

    // Dropping the senders wakes followers with an error.
    fn abandon(&self, key: &CacheKey) {
        self.waiters.remove(key);
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

// Clears the pending entry even if processing unwinds.
struct Settle<'a> {
    pending: &'a PendingTable,
    key: CacheKey,
    done: bool,
}

impl Settle<'_> {
    fn complete(mut self, submission: &Submission) {
        self.pending.complete(&self.key, submission);
        self.done = true;
    }
}

impl Drop for Settle<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.pending.abandon(&self.key);
        }
    }
}

/// Per-worker dispatch loop: Idle until something is enqueued, then runs
/// cycles of at most MAX_BATCH_SIZE concurrent requests until the queue is empty.
pub struct BatchDispatcher {
    worker: WorkerId,
    queue: Mutex<PriorityQueue<AnalysisRequest>>,
    pending: PendingTable,
    dispatching: AtomicBool,
    active_batches: AtomicUsize,
    cache: SharedCache,
    upstream: Arc<dyn InferenceBackend>,
    upstream_timeout: Duration,
    stats: Arc<WorkerStats>,
}

impl BatchDispatcher {
    pub fn new(
        worker: WorkerId,
        cache: SharedCache,
        upstream: Arc<dyn InferenceBackend>,
        upstream_timeout: Duration,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            worker,
            queue: Mutex::new(PriorityQueue::new()),
            pending: PendingTable::default(),
            dispatching: AtomicBool::new(false),
            active_batches: AtomicUsize::new(0),
            cache,
            upstream,
            upstream_timeout,
            stats,
        }
    }

    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    pub fn enqueue(&self, request: AnalysisRequest) {
        let priority = request.priority;
        self.queue.lock().enqueue(request, priority);
        QUEUE_DEPTH.inc();
    }

    /// Move a still-queued request for `key` to the head of the queue.
    pub fn promote(&self, key: &CacheKey) -> bool {
        self.queue.lock().promote(|r| &r.key == key)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn active_batches(&self) -> usize {
        self.active_batches.load(Ordering::Relaxed)
    }

    pub fn is_dispatching(&self) -> bool {
        self.dispatching.load(Ordering::Acquire)
    }

    /// Start a dispatch loop unless one is already running.
    pub fn trigger(self: &Arc<Self>) {
        if self
            .dispatching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tokio::spawn(Arc::clone(self).drain());
        }
    }

    async fn drain(self: Arc<Self>) {
        loop {
            while self.run_cycle().await > 0 {
                tokio::task::yield_now().await;
            }
            self.dispatching.store(false, Ordering::Release);

            // an enqueue may have landed after the last empty cycle
            let reclaim = !self.queue.lock().is_empty()
                && self
                    .dispatching
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok();
            if !reclaim {
                break;
            }
        }
    }

    /// Take up to MAX_BATCH_SIZE requests and wait for all of them to settle.
    /// Returns how many were dispatched.
    pub async fn run_cycle(self: &Arc<Self>) -> usize {
        let batch = self.queue.lock().dequeue_up_to(MAX_BATCH_SIZE);
        if batch.is_empty() {
            return 0;
        }
        let size = batch.len();
        QUEUE_DEPTH.sub(size as f64);
        BATCH_SIZE.observe(size as f64);
        self.stats.record_cycle();
        self.active_batches.fetch_add(1, Ordering::Relaxed);
        debug!(worker = %self.worker, size, "dispatching batch");

        // one task per request so a panic stays with its own request
        let tasks = batch
            .into_iter()
            .map(|request| tokio::spawn(Arc::clone(self).process(request)));
        for outcome in join_all(tasks).await {
            if let Err(e) = outcome {
                error!(worker = %self.worker, error = %e, "request task failed");
            }
        }

        self.active_batches.fetch_sub(1, Ordering::Relaxed);
        size
    }

    async fn process(self: Arc<Self>, request: AnalysisRequest) {
        let settle = Settle {
            pending: &self.pending,
            key: request.key.clone(),
            done: false,
        };
        let submission = self.resolve(&request).await;
        REQUEST_LATENCY.observe(request.submitted_at.elapsed().as_secs_f64());
        request.resolve(submission.clone());
        settle.complete(&submission);
    }

    async fn resolve(&self, request: &AnalysisRequest) -> Submission {
        // a sibling may have filled the cache while this one waited
        if let Some(hit) = self.cache.recheck(&request.key).await {
            self.stats.record_cache_hit();
            return Submission {
                result: hit,
                cached: true,
            };
        }

        let result = match self.call_upstream(&request.signature).await {
            Ok(report) => {
                let report = report.with_worker(self.worker);
                self.cache.store(&request.key, &report).await;
                self.stats.record_upstream();
                report
            }
            Err(e) => {
                UPSTREAM_FAILURES.inc();
                FALLBACKS.inc();
                self.stats.record_fallback();
                warn!(worker = %self.worker, key = %request.key, error = %e, "upstream failed, serving fallback estimate");
                fallback::estimate(&request.signature).with_worker(self.worker)
            }
        };
        Submission {
            result,
            cached: false,
        }
    }

    async fn call_upstream(
        &self,
        signature: &ProductSignature,
    ) -> Result<AnalysisResult, UpstreamError> {
        UPSTREAM_CALLS.inc();
        let prompt = build_prompt(signature);
        let call = self.upstream.invoke(&prompt, self.upstream_timeout);
        let raw = tokio::time::timeout(self.upstream_timeout, call)
            .await
            .map_err(|_| UpstreamError::Timeout(self.upstream_timeout))??;
        parse_report(&raw)
    }
}
