//! Redis-backed shared cache. Connection is established lazily and dropped on
//! error so the next operation reconnects.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use super::{CacheKey, CacheStatus, CacheStore};
use crate::error::CacheError;
use crate::models::AnalysisResult;

pub struct RedisCacheStore {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisCacheStore {
    pub fn open(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_async_connection().await?;
        info!("Redis connection established");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn reset(&self) {
        *self.connection.lock().await = None;
    }

    async fn checked<T>(&self, result: redis::RedisResult<T>) -> Result<T, CacheError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                self.reset().await;
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<AnalysisResult>, CacheError> {
        let mut conn = self.connection().await?;
        let data: Option<String> = self.checked(conn.get(key.as_str()).await).await?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set_with_ttl(
        &self,
        key: &CacheKey,
        value: &AnalysisResult,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string(value)?;
        let mut conn = self.connection().await?;
        let written = conn
            .set_ex::<_, _, ()>(key.as_str(), json, ttl.as_secs().max(1))
            .await;
        self.checked(written).await
    }

    async fn status(&self) -> CacheStatus {
        let connected = match self.connection().await {
            Ok(mut conn) => {
                let pong: redis::RedisResult<String> =
                    redis::cmd("PING").query_async(&mut conn).await;
                self.checked(pong).await.is_ok()
            }
            Err(_) => false,
        };
        CacheStatus {
            backend: "redis",
            connected,
            entries: None,
        }
    }
}
