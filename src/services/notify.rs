use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::Notification;

/// Errors that can occur when delivering a notification
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Notification channel closed for {0}")]
    ChannelClosed(String),
}

/// Per-identity sink for terminal match outcomes
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_name: &str, notification: Notification) -> Result<(), NotifyError>;
}

/// Redis pub/sub backed notifier
///
/// Publishes each outcome as JSON to `notify:{userName}`, where the
/// frontend gateway subscribes on behalf of its connected user.
pub struct RedisNotifier {
    redis: Arc<tokio::sync::Mutex<ConnectionManager>>,
}

impl RedisNotifier {
    pub async fn connect(redis_url: &str) -> Result<Self, NotifyError> {
        let client = redis::Client::open(redis_url)?;
        let redis = redis::aio::ConnectionManager::new(client).await?;

        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(redis)),
        })
    }

    fn channel(user_name: &str) -> String {
        format!("notify:{}", user_name)
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn notify(&self, user_name: &str, notification: Notification) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(&notification)?;
        let mut conn = self.redis.lock().await;
        redis::cmd("PUBLISH")
            .arg(Self::channel(user_name))
            .arg(payload)
            .query_async::<()>(&mut *conn)
            .await?;
        drop(conn);

        tracing::debug!("Notified {}: {:?}", user_name, notification);
        Ok(())
    }
}

/// Channel-backed notifier for embedding and tests
///
/// Outcomes arrive on the paired receiver as `(userName, notification)`.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<(String, Notification)>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, Notification)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, user_name: &str, notification: Notification) -> Result<(), NotifyError> {
        self.tx
            .send((user_name.to_string(), notification))
            .map_err(|_| NotifyError::ChannelClosed(user_name.to_string()))
    }
}
