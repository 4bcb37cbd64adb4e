use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::metrics::{CACHE_ERRORS, CACHE_HITS, CACHE_MISSES};
use crate::models::{AnalysisResult, ProductSignature};

mod memory;
mod redis_store;

pub use self::memory::MemoryCacheStore;
pub use self::redis_store::RedisCacheStore;

// Bumped whenever the AnalysisResult shape changes.
pub const SCHEMA_TAG: &str = "impact-v1";

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Fixed-length fingerprint of a canonical product signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    // Every field is length-prefixed, so no byte inside a value can act as a
    // separator. Order: name, brand, category, ingredients, schema tag, version.
    pub fn for_signature(signature: &ProductSignature, version: &str) -> Self {
        let sig = signature.normalized();
        let mut hasher = Sha256::new();
        for field in [&sig.name, &sig.brand, &sig.category] {
            hash_field(&mut hasher, field);
        }
        hasher.update((sig.ingredients.len() as u64).to_le_bytes());
        for ingredient in &sig.ingredients {
            hash_field(&mut hasher, ingredient);
        }
        hash_field(&mut hasher, SCHEMA_TAG);
        hash_field(&mut hasher, version);
        CacheKey(format!("impact:{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn hash_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub backend: &'static str,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<usize>,
}

/// Key-value store shared by every worker.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<AnalysisResult>, CacheError>;

    async fn set_with_ttl(
        &self,
        key: &CacheKey,
        value: &AnalysisResult,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn status(&self) -> CacheStatus;
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub op_timeout: Duration,
    /// Upstream model name, folded into every key next to the schema tag.
    pub model: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            op_timeout: Duration::from_millis(500),
            model: "llama3".to_string(),
        }
    }
}

/// Fail-open view of a CacheStore: errors and timeouts read as misses and
/// failed writes are logged and dropped.
#[derive(Clone)]
pub struct SharedCache {
    store: Arc<dyn CacheStore>,
    settings: Arc<CacheSettings>,
}

impl SharedCache {
    pub fn new(store: Arc<dyn CacheStore>, settings: CacheSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }

    pub fn key_for(&self, signature: &ProductSignature) -> CacheKey {
        CacheKey::for_signature(signature, &self.settings.model)
    }

    pub fn ttl(&self) -> Duration {
        self.settings.ttl
    }

    pub async fn lookup(&self, key: &CacheKey) -> Option<AnalysisResult> {
        let found = self.fetch(key).await;
        if found.is_some() {
            CACHE_HITS.inc();
            debug!(key = %key, "cache hit");
        } else {
            CACHE_MISSES.inc();
        }
        found
    }

    /// Second look for a key whose miss was already counted by `lookup`.
    pub async fn recheck(&self, key: &CacheKey) -> Option<AnalysisResult> {
        let found = self.fetch(key).await;
        if found.is_some() {
            CACHE_HITS.inc();
            debug!(key = %key, "cache hit on recheck");
        }
        found
    }

    // Errors and timeouts read as misses.
    async fn fetch(&self, key: &CacheKey) -> Option<AnalysisResult> {
        match tokio::time::timeout(self.settings.op_timeout, self.store.get(key)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                CACHE_ERRORS.inc();
                warn!(key = %key, error = %e, "cache read failed, treating as miss");
                None
            }
            Err(_) => {
                CACHE_ERRORS.inc();
                warn!(key = %key, "cache read timed out, treating as miss");
                None
            }
        }
    }

    pub async fn store(&self, key: &CacheKey, value: &AnalysisResult) {
        let write = self.store.set_with_ttl(key, value, self.settings.ttl);
        match tokio::time::timeout(self.settings.op_timeout, write).await {
            Ok(Ok(())) => debug!(key = %key, "cached upstream result"),
            Ok(Err(e)) => {
                CACHE_ERRORS.inc();
                warn!(key = %key, error = %e, "cache write failed");
            }
            Err(_) => {
                CACHE_ERRORS.inc();
                warn!(key = %key, error = %CacheError::Timeout, "cache write failed");
            }
        }
    }

    pub async fn status(&self) -> CacheStatus {
        self.store.status().await
    }
}
