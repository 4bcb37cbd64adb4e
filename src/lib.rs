//! Acceleration layer in front of a slow, rate-limited impact analysis model:
//! shared TTL cache, per-worker priority queue, bounded-fanout dispatch and a
//! deterministic fallback whenever the model cannot answer.

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fallback;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod prompt;
pub mod queue;
pub mod server;
pub mod state;
pub mod supervisor;
pub mod upstream;
pub mod worker;

pub use error::AnalysisError;
pub use models::{AnalysisResult, Priority, ProductSignature, Provenance, Submission};
pub use worker::{Worker, WorkerId};
