use clap::Parser;
use std::time::Duration;

use crate::cache::CacheSettings;
use crate::upstream::UpstreamSettings;
use crate::worker::WorkerSettings;

// CLI argument structure; every option can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "impact-accelerator")]
#[command(about = "Caching, batching front end for a rate-limited impact analysis model")]
#[command(version)]
pub struct Args {
    // Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Worker count, defaults to one per available core
    #[arg(short, long, env = "WORKERS")]
    pub workers: Option<usize>,

    // Inference endpoint
    #[arg(long, env = "INFERENCE_URL", default_value = "http://localhost:11434/api/generate")]
    pub upstream_url: String,

    // Bearer credential for the inference endpoint
    #[arg(long, env = "INFERENCE_API_KEY", hide_env_values = true)]
    pub upstream_api_key: Option<String>,

    #[arg(long, env = "INFERENCE_MODEL", default_value = "llama3")]
    pub upstream_model: String,

    // Per-call timeout in seconds
    #[arg(long, env = "INFERENCE_TIMEOUT_SECS", default_value_t = 30)]
    pub upstream_timeout: u64,

    // Concurrent upstream connections per worker
    #[arg(long, env = "MAX_SOCKETS", default_value_t = 50)]
    pub max_sockets: usize,

    // Idle keep-alive connections retained per worker
    #[arg(long, env = "MAX_IDLE_SOCKETS", default_value_t = 10)]
    pub max_idle_sockets: usize,

    // Seconds an idle connection is kept
    #[arg(long, env = "IDLE_SOCKET_TIMEOUT_SECS", default_value_t = 30)]
    pub idle_timeout: u64,

    // Redis host; without one the workers share an in-process cache
    #[arg(long, env = "REDIS_HOST")]
    pub redis_host: Option<String>,

    #[arg(long, env = "REDIS_PORT", default_value_t = 6379)]
    pub redis_port: u16,

    // Cache TTL in seconds
    #[arg(short, long, env = "CACHE_TTL_SECS", default_value_t = 3600)]
    pub cache_ttl: u64,

    // Budget for a single cache read or write in milliseconds
    #[arg(long, env = "CACHE_TIMEOUT_MS", default_value_t = 500)]
    pub cache_timeout_ms: u64,
}

impl Args {
    pub fn worker_count(&self) -> usize {
        self.workers
            .filter(|n| *n > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
    }

    pub fn redis_url(&self) -> Option<String> {
        self.redis_host
            .as_ref()
            .map(|host| format!("redis://{}:{}/", host, self.redis_port))
    }

    pub fn upstream_settings(&self) -> UpstreamSettings {
        UpstreamSettings {
            url: self.upstream_url.clone(),
            api_key: self.upstream_api_key.clone(),
            model: self.upstream_model.clone(),
            max_sockets: self.max_sockets,
            max_idle_sockets: self.max_idle_sockets,
            idle_timeout: Duration::from_secs(self.idle_timeout),
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.cache_ttl),
            op_timeout: Duration::from_millis(self.cache_timeout_ms),
            model: self.upstream_model.clone(),
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            upstream_timeout: Duration::from_secs(self.upstream_timeout),
        }
    }
}
