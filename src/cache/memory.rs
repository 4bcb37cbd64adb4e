use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::{CacheKey, CacheStatus, CacheStore};
use crate::error::CacheError;
use crate::metrics::CACHE_SIZE;
use crate::models::AnalysisResult;

// Cache entry with timestamp
#[derive(Clone)]
struct CacheEntry {
    value: AnalysisResult,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_live(&self) -> bool {
        self.stored_at.elapsed() < self.ttl
    }
}

/// Process-wide store used when no Redis host is configured. Every worker
/// thread holds the same instance, so it plays the shared-cache role.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<AnalysisResult>, CacheError> {
        if let Some(entry) = self.entries.get(key.as_str()) {
            if entry.is_live() {
                return Ok(Some(entry.value.clone()));
            }
        }
        // expired entries go at read time; a concurrent overwrite survives
        if self
            .entries
            .remove_if(key.as_str(), |_, entry| !entry.is_live())
            .is_some()
        {
            CACHE_SIZE.set(self.entries.len() as f64);
        }
        Ok(None)
    }

    async fn set_with_ttl(
        &self,
        key: &CacheKey,
        value: &AnalysisResult,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.entries.insert(
            key.as_str().to_string(),
            CacheEntry {
                value: value.clone(),
                stored_at: Instant::now(),
                ttl,
            },
        );
        CACHE_SIZE.set(self.entries.len() as f64);
        Ok(())
    }

    async fn status(&self) -> CacheStatus {
        CacheStatus {
            backend: "memory",
            connected: true,
            entries: Some(self.entries.len()),
        }
    }
}
