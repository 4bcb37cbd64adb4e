use std::net::TcpListener;
use std::sync::Arc;
use tracing::info;

use crate::cache::{CacheSettings, CacheStore, MemoryCacheStore, RedisCacheStore, SharedCache};
use crate::handlers;
use crate::state::AppState;
use crate::upstream::{UpstreamClient, UpstreamSettings};
use crate::worker::{Worker, WorkerId, WorkerSettings};

/// Where workers keep shared results.
#[derive(Clone)]
pub enum CacheBackend {
    /// One store for the whole process.
    Memory(Arc<MemoryCacheStore>),
    /// Each worker opens its own connection to the same server.
    Redis(String),
}

impl CacheBackend {
    pub fn from_url(redis_url: Option<String>) -> Self {
        match redis_url {
            Some(url) => CacheBackend::Redis(url),
            None => CacheBackend::Memory(Arc::new(MemoryCacheStore::new())),
        }
    }

    fn open(&self) -> anyhow::Result<Arc<dyn CacheStore>> {
        Ok(match self {
            CacheBackend::Memory(store) => Arc::clone(store) as Arc<dyn CacheStore>,
            CacheBackend::Redis(url) => Arc::new(RedisCacheStore::open(url)?),
        })
    }

    pub fn describe(&self) -> &'static str {
        match self {
            CacheBackend::Memory(_) => "memory",
            CacheBackend::Redis(_) => "redis",
        }
    }
}

/// Everything a worker thread needs to build its own service instance.
pub struct ServerContext {
    pub listener: TcpListener,
    pub cache: CacheBackend,
    pub cache_settings: CacheSettings,
    pub upstream: UpstreamSettings,
    pub worker: WorkerSettings,
}

impl ServerContext {
    /// Run one worker to completion on the calling thread, on its own
    /// single-threaded runtime and its own clone of the listening socket.
    pub fn run_worker(&self, id: WorkerId) -> anyhow::Result<()> {
        let listener = self.listener.try_clone()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        runtime.block_on(async move {
            let cache = SharedCache::new(self.cache.open()?, self.cache_settings.clone());
            let upstream = Arc::new(UpstreamClient::new(self.upstream.clone())?);
            let worker = Worker::new(id, cache, upstream, self.worker.clone());
            let app = handlers::router(Arc::new(AppState::new(worker)));

            let listener = tokio::net::TcpListener::from_std(listener)?;
            info!(worker = %id, cache = self.cache.describe(), "worker accepting requests");
            axum::serve(listener, app).await?;
            Ok::<(), anyhow::Error>(())
        })
    }
}
