use lazy_static::lazy_static;
use prometheus::{
    Counter, Encoder, Gauge, Histogram, TextEncoder, histogram_opts, register_counter,
    register_gauge, register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("impact_requests_total", "Total number of analysis requests").unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("impact_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("impact_cache_misses_total", "Total cache misses").unwrap();
    pub static ref CACHE_ERRORS: Counter =
        register_counter!("impact_cache_errors_total", "Cache reads or writes that failed").unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("impact_cache_size", "Entries in the in-process cache").unwrap();
    pub static ref UPSTREAM_CALLS: Counter =
        register_counter!("impact_upstream_calls_total", "Calls made to the inference endpoint").unwrap();
    pub static ref UPSTREAM_FAILURES: Counter =
        register_counter!("impact_upstream_failures_total", "Inference calls that failed or timed out").unwrap();
    pub static ref FALLBACKS: Counter =
        register_counter!("impact_fallbacks_total", "Requests resolved by the fallback estimator").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "impact_request_latency_seconds",
        "Time from submission to resolution in seconds"
    )
    .unwrap();
    pub static ref BATCH_SIZE: Histogram = register_histogram!(histogram_opts!(
        "impact_dispatch_batch_size",
        "Requests dispatched per cycle",
        vec![1.0, 2.0, 3.0, 4.0, 5.0]
    ))
    .unwrap();
    pub static ref QUEUE_DEPTH: Gauge =
        register_gauge!("impact_queue_depth", "Requests waiting in worker queues").unwrap();
    pub static ref WORKER_RESTARTS: Counter =
        register_counter!("impact_worker_restarts_total", "Workers respawned by the supervisor").unwrap();
}

/// Render every registered metric in the Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
