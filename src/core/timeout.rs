use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::core::engine::EngineError;
use crate::models::Notification;
use crate::services::notify::Notifier;
use crate::services::store::{RequestStore, StoreKey};

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

struct SupervisorInner<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    timers: tokio::sync::Mutex<HashMap<String, ArmedTimer>>,
    next_generation: AtomicU64,
}

/// Per-identity expiry timers for waiting match requests
///
/// At most one timer is armed per identity; arming again replaces the
/// previous timer. A fired timer re-checks store state before declaring
/// "not found": the cancellation marker first, then an atomic take of the
/// pending entry. If the entry is already gone a match or cancellation
/// won the race and the timer does nothing.
pub struct TimeoutSupervisor<S, N> {
    inner: Arc<SupervisorInner<S, N>>,
}

impl<S, N> TimeoutSupervisor<S, N>
where
    S: RequestStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                store,
                notifier,
                timers: tokio::sync::Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Schedule an expiry for `user_name` after `duration`
    ///
    /// Any previously armed timer for the identity is disarmed first.
    pub async fn arm(&self, user_name: &str, duration: Duration) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let user = user_name.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            SupervisorInner::fire(inner, user, generation).await;
        });

        let mut timers = self.inner.timers.lock().await;
        if let Some(previous) = timers.insert(user_name.to_string(), ArmedTimer { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Cancel any armed timer for `user_name`
    ///
    /// Idempotent: safe to call when no timer exists or one already fired.
    pub async fn disarm(&self, user_name: &str) {
        let mut timers = self.inner.timers.lock().await;
        if let Some(timer) = timers.remove(user_name) {
            timer.handle.abort();
        }
    }

    /// Number of currently armed timers, for diagnostics
    pub async fn armed_count(&self) -> usize {
        self.inner.timers.lock().await.len()
    }
}

impl<S, N> SupervisorInner<S, N>
where
    S: RequestStore,
    N: Notifier,
{
    async fn fire(inner: Arc<Self>, user: String, generation: u64) {
        {
            // Only forget the handle if it is still our own; a duplicate
            // submission may have armed a newer timer in the meantime.
            let mut timers = inner.timers.lock().await;
            if timers.get(&user).map(|t| t.generation) == Some(generation) {
                timers.remove(&user);
            }
        }

        if let Err(e) = inner.expire(&user).await {
            error!("Expiry for {} failed: {}", user, e);
        }
    }

    async fn expire(&self, user: &str) -> Result<(), EngineError> {
        if self.store.get(&StoreKey::cancelled(user)).await?.is_some() {
            debug!("Match request for {} was cancelled, timer is a no-op", user);
            return Ok(());
        }

        // Whoever deletes the entry first wins; an absent entry means a
        // match or cancellation got there before us.
        if self.store.take(&StoreKey::entry(user)).await?.is_some() {
            info!("No match found for {} before timeout", user);
            self.notifier.notify(user, Notification::NotFound).await?;
        }
        Ok(())
    }
}

impl<S, N> Clone for TimeoutSupervisor<S, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
