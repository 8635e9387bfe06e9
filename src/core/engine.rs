use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::core::resolver::QueueResolver;
use crate::core::timeout::TimeoutSupervisor;
use crate::models::{IntakeMessage, MatchRequest, Notification};
use crate::services::notify::{Notifier, NotifyError};
use crate::services::queue::IntakeQueue;
use crate::services::store::{RequestStore, StoreError, StoreKey};

/// Errors surfaced by the engine's public operations
///
/// Store failures are transient infrastructure trouble: the request is not
/// marked resolved and the caller relies on channel redelivery or retry.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Intake and dispatch for match requests
///
/// `submit` and `cancel` drive the per-identity state machine:
///
/// ```text
/// IDLE --submit--> WAITING --(match found)--> MATCHED
/// WAITING --(timeout fires)--> EXPIRED
/// WAITING --cancel--> CANCELLED
/// WAITING --submit (duplicate)--> WAITING (restarted)
/// ```
///
/// All durable state lives in the shared request store, so any number of
/// engine workers can process the same intake channel concurrently.
pub struct MatchEngine<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    resolver: QueueResolver<S>,
    supervisor: TimeoutSupervisor<S, N>,
    wait: Duration,
    entry_ttl: Duration,
}

impl<S, N> MatchEngine<S, N>
where
    S: RequestStore + 'static,
    N: Notifier + 'static,
{
    /// Build an engine over a store and notification sink
    ///
    /// `wait` is how long a request may sit unmatched before "not found";
    /// `entry_ttl` bounds every store record and should exceed `wait`
    /// slightly so a timer never observes its entry expire early.
    pub fn new(store: Arc<S>, notifier: Arc<N>, wait: Duration, entry_ttl: Duration) -> Self {
        let resolver = QueueResolver::new(Arc::clone(&store), entry_ttl);
        let supervisor = TimeoutSupervisor::new(Arc::clone(&store), Arc::clone(&notifier));
        Self {
            store,
            notifier,
            resolver,
            supervisor,
            wait,
            entry_ttl,
        }
    }

    /// Process a match request
    ///
    /// On an immediate match both parties are notified with each other's
    /// identity and all shared state for both is cleared. Otherwise the
    /// request waits in both tier queues with an armed expiry timer.
    /// Resubmitting while waiting restarts the wait.
    pub async fn submit(&self, request: MatchRequest) -> Result<(), EngineError> {
        let user = request.user_name.clone();

        // Duplicate submission replaces the prior wait
        self.supervisor.disarm(&user).await;
        self.store.delete(&StoreKey::cancelled(&user)).await?;

        let payload = serde_json::to_string(&request)?;
        self.store
            .set_with_ttl(&StoreKey::entry(&user), &payload, self.entry_ttl)
            .await?;

        match self.resolver.try_match(&request).await? {
            Some(peer) => {
                // The peer's entry was consumed by the claim; clear the
                // rest of both identities' state before anyone can reuse it.
                self.store.delete(&StoreKey::entry(&user)).await?;
                self.clear_queue_memberships(&request).await?;
                self.clear_queue_memberships(&peer).await?;
                self.supervisor.disarm(&peer.user_name).await;

                info!("Match found between {} and {}", user, peer.user_name);
                self.notifier
                    .notify(&user, Notification::match_found(&peer.user_name))
                    .await?;
                self.notifier
                    .notify(&peer.user_name, Notification::match_found(&user))
                    .await?;
            }
            None => {
                info!(
                    "No immediate match for {}, waiting up to {}s",
                    user,
                    self.wait.as_secs()
                );
                self.supervisor.arm(&user, self.wait).await;
            }
        }
        Ok(())
    }

    /// Cancel a waiting match request
    ///
    /// Cancelling an identity with no live request is a silent no-op;
    /// cancellation can legitimately arrive after a match or expiry
    /// already resolved the request.
    pub async fn cancel(&self, user_name: &str) -> Result<(), EngineError> {
        self.supervisor.disarm(user_name).await;

        // Marker for expiry timers owned by other workers
        self.store
            .set_with_ttl(&StoreKey::cancelled(user_name), "1", self.entry_ttl)
            .await?;

        match self.store.take(&StoreKey::entry(user_name)).await? {
            Some(json) => {
                match serde_json::from_str::<MatchRequest>(&json) {
                    Ok(request) => self.clear_queue_memberships(&request).await?,
                    Err(e) => warn!("Cancelled entry for {} was corrupt: {}", user_name, e),
                }
                info!("Match request for {} was cancelled", user_name);
                self.notifier.notify(user_name, Notification::Cancelled).await?;
            }
            None => {
                debug!("Cancellation for {} had no live request", user_name);
            }
        }
        Ok(())
    }

    /// Consume intake messages until shutdown is signalled
    ///
    /// Store failures are logged and the message is dropped for channel
    /// redelivery; nothing here is fatal to the worker.
    pub async fn run_worker(&self, queue: &IntakeQueue) -> Result<(), EngineError> {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, draining worker");
                    return Ok(());
                }
                message = queue.next() => match message {
                    Ok(Some(IntakeMessage::Submit { request })) => {
                        if let Err(e) = request.validate() {
                            warn!("Rejecting invalid match request: {}", e);
                            continue;
                        }
                        if let Err(e) = self.submit(request).await {
                            error!("Submit failed, relying on redelivery: {}", e);
                        }
                    }
                    Ok(Some(IntakeMessage::Cancel { user_name })) => {
                        if let Err(e) = self.cancel(&user_name).await {
                            error!("Cancel for {} failed: {}", user_name, e);
                        }
                    }
                    Ok(None) => {} // idle tick
                    Err(e) => {
                        error!("Intake channel unavailable: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }

    async fn clear_queue_memberships(&self, request: &MatchRequest) -> Result<(), StoreError> {
        self.store
            .remove_from_set(
                &StoreKey::exact_queue(&request.topic, request.difficulty),
                &request.user_name,
            )
            .await?;
        self.store
            .remove_from_set(&StoreKey::broad_queue(&request.topic), &request.user_name)
            .await?;
        Ok(())
    }
}
