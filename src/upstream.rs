use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::UpstreamError;

// Generate API request format
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

// Generate API response format
#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    model: Option<String>,
    response: String,
}

/// Unparsed model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub model: Option<String>,
    pub text: String,
}

/// The inference endpoint as seen by the dispatcher. Implementations only move
/// bytes; prompt construction and parsing live elsewhere.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn invoke(&self, prompt: &str, timeout: Duration) -> Result<RawResponse, UpstreamError>;
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_sockets: usize,
    pub max_idle_sockets: usize,
    pub idle_timeout: Duration,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434/api/generate".to_string(),
            api_key: None,
            model: "llama3".to_string(),
            max_sockets: 50,
            max_idle_sockets: 10,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Keep-alive client for the inference endpoint. Concurrent requests are capped
/// at `max_sockets`; idle connections are retained up to `max_idle_sockets`.
pub struct UpstreamClient {
    client: reqwest::Client,
    settings: UpstreamSettings,
    sockets: Semaphore,
}

impl UpstreamClient {
    pub fn new(settings: UpstreamSettings) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(settings.max_idle_sockets)
            .pool_idle_timeout(settings.idle_timeout)
            .tcp_keepalive(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("impact-accelerator/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let sockets = Semaphore::new(settings.max_sockets.max(1));
        Ok(Self {
            client,
            settings,
            sockets,
        })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    async fn send(&self, prompt: &str, timeout: Duration) -> Result<RawResponse, UpstreamError> {
        let _permit = self
            .sockets
            .acquire()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let body = GenerateRequest {
            model: &self.settings.model,
            prompt,
            stream: false,
            format: "json",
        };
        let mut request = self.client.post(&self.settings.url).timeout(timeout).json(&body);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await.map_err(|e| classify(e, timeout))?;
        let status = res.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }
        let parsed: GenerateResponse = res.json().await.map_err(|e| classify(e, timeout))?;
        debug!(model = ?parsed.model, bytes = parsed.response.len(), "upstream responded");
        Ok(RawResponse {
            model: parsed.model,
            text: parsed.response,
        })
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout(timeout)
    } else {
        err.into()
    }
}

#[async_trait]
impl InferenceBackend for UpstreamClient {
    async fn invoke(&self, prompt: &str, timeout: Duration) -> Result<RawResponse, UpstreamError> {
        // the deadline covers waiting for a socket as well as the exchange
        tokio::time::timeout(timeout, self.send(prompt, timeout))
            .await
            .map_err(|_| UpstreamError::Timeout(timeout))?
    }
}
