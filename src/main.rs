use clap::Parser;
use impact_accelerator::config::Args;
use impact_accelerator::server::{CacheBackend, ServerContext};
use impact_accelerator::supervisor::Supervisor;
use std::sync::Arc;
use tracing::{info, warn};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "impact_accelerator=info,tower_http=info".into()),
        )
        .init();

    // parse cli arguments
    let args = Args::parse();
    let workers = args.worker_count();

    let listener = std::net::TcpListener::bind((args.host.as_str(), args.port))?;
    listener.set_nonblocking(true)?;

    let cache = CacheBackend::from_url(args.redis_url());
    info!(
        addr = %listener.local_addr()?,
        upstream = %args.upstream_url,
        model = %args.upstream_model,
        cache = cache.describe(),
        cache_ttl = args.cache_ttl,
        workers,
        "impact accelerator starting"
    );

    let context = Arc::new(ServerContext {
        listener,
        cache,
        cache_settings: args.cache_settings(),
        upstream: args.upstream_settings(),
        worker: args.worker_settings(),
    });

    let supervisor = Supervisor::new(workers, Arc::new(move |id| context.run_worker(id)));
    supervisor.run(shutdown_signal()).await
}
