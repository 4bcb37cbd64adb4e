#![allow(dead_code)]

use async_trait::async_trait;
use impact_accelerator::cache::{
    CacheKey, CacheSettings, CacheStatus, CacheStore, MemoryCacheStore, SharedCache,
};
use impact_accelerator::error::{CacheError, UpstreamError};
use impact_accelerator::models::AnalysisResult;
use impact_accelerator::upstream::{InferenceBackend, RawResponse};
use impact_accelerator::worker::{Worker, WorkerId, WorkerSettings};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const REPORT: &str = r#"{
  "carbonFootprint": {"total": 0.42, "perUnit": 0.42,
    "breakdown": {"production": 0.2, "transport": 0.1, "packaging": 0.1, "distribution": 0.02}},
  "waterUsage": {"total": 2.0, "breakdown": {"agriculture": 1.4, "processing": 0.4, "packaging": 0.2}},
  "sustainabilityScore": 64,
  "alternatives": [{"name": "Sparkling water", "reason": "No added sugar"}],
  "keyFindings": ["Packaging is the largest share"]
}"#;

pub enum Behavior {
    Succeed,
    Fail(u16),
    Hang,
}

/// Backend that counts calls and answers according to its behavior.
pub struct MockBackend {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub behavior: Behavior,
}

impl MockBackend {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Self::with_delay(behavior, Duration::ZERO)
    }

    pub fn with_delay(behavior: Behavior, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            behavior,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceBackend for MockBackend {
    async fn invoke(&self, _prompt: &str, _timeout: Duration) -> Result<RawResponse, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match self.behavior {
            Behavior::Succeed => Ok(RawResponse {
                model: Some("mock".to_string()),
                text: REPORT.to_string(),
            }),
            Behavior::Fail(status) => Err(UpstreamError::Status(status)),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

/// Cache whose server is gone.
pub struct UnreachableCache;

#[async_trait]
impl CacheStore for UnreachableCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<AnalysisResult>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn set_with_ttl(
        &self,
        _key: &CacheKey,
        _value: &AnalysisResult,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn status(&self) -> CacheStatus {
        CacheStatus {
            backend: "unreachable",
            connected: false,
            entries: None,
        }
    }
}

pub fn memory_cache() -> SharedCache {
    SharedCache::new(Arc::new(MemoryCacheStore::new()), CacheSettings::default())
}

pub fn worker_with(
    cache: SharedCache,
    backend: Arc<dyn InferenceBackend>,
    upstream_timeout: Duration,
) -> Worker {
    Worker::new(
        WorkerId::new(0),
        cache,
        backend,
        WorkerSettings { upstream_timeout },
    )
}

pub fn worker(backend: Arc<dyn InferenceBackend>) -> Worker {
    worker_with(memory_cache(), backend, Duration::from_secs(5))
}
