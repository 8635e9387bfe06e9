use redis::aio::ConnectionManager;
use std::sync::Arc;
use thiserror::Error;

use crate::models::IntakeMessage;

/// Errors that can occur on the intake channel
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Shared intake channel carrying submit/cancel messages
///
/// Backed by a Redis list: producers LPUSH serialized messages, workers
/// BRPOP them. Any number of workers may consume the same list; each
/// message is delivered to exactly one of them.
pub struct IntakeQueue {
    redis: Arc<tokio::sync::Mutex<ConnectionManager>>,
    queue_key: String,
}

impl IntakeQueue {
    pub async fn connect(redis_url: &str, queue_name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let redis = redis::aio::ConnectionManager::new(client).await?;

        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(redis)),
            queue_key: queue_name.to_string(),
        })
    }

    /// Publish a message for some worker to consume
    pub async fn publish(&self, message: &IntakeMessage) -> Result<(), QueueError> {
        let payload = serde_json::to_string(message)?;
        let mut conn = self.redis.lock().await;
        redis::cmd("LPUSH")
            .arg(&self.queue_key)
            .arg(payload)
            .query_async::<()>(&mut *conn)
            .await?;
        Ok(())
    }

    /// Block up to one second for the next message
    ///
    /// Returns `Ok(None)` on an idle tick or when a payload could not be
    /// decoded; a poison message is logged and dropped rather than wedging
    /// the worker.
    pub async fn next(&self) -> Result<Option<IntakeMessage>, QueueError> {
        let mut conn = self.redis.lock().await;
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.queue_key)
            .arg(1)
            .query_async(&mut *conn)
            .await?;
        drop(conn);

        let Some((_, payload)) = popped else {
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(message) => Ok(Some(message)),
            Err(e) => {
                tracing::warn!("Discarding undecodable intake payload: {}", e);
                Ok(None)
            }
        }
    }
}
