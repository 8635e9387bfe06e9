use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::MatchRequest;
use crate::services::store::{RequestStore, StoreError, StoreKey};

/// Tiered matching over the request store
///
/// Two tiers exist per request: an EXACT queue keyed by (topic,
/// difficulty) and a BROAD queue keyed by topic alone. Candidates are
/// claimed with destructive reads, so two concurrent resolvers can never
/// select the same waiting identity.
pub struct QueueResolver<S> {
    store: Arc<S>,
    entry_ttl: Duration,
}

impl<S: RequestStore> QueueResolver<S> {
    pub fn new(store: Arc<S>, entry_ttl: Duration) -> Self {
        Self { store, entry_ttl }
    }

    /// Attempt to pair `request` with a waiting user
    ///
    /// Tries the EXACT tier first, then the BROAD tier. On a hit the
    /// peer's pending entry has already been consumed atomically; the
    /// caller only cleans up queue memberships and its own entry. On a
    /// miss the requester is enqueued into both tiers and `None` is
    /// returned; the caller owns the pending entry and the timeout clock.
    pub async fn try_match(&self, request: &MatchRequest) -> Result<Option<MatchRequest>, StoreError> {
        let exact_key = StoreKey::exact_queue(&request.topic, request.difficulty);
        if let Some(peer) = self.claim_from(&exact_key, &request.user_name).await? {
            return Ok(Some(peer));
        }

        let broad_key = StoreKey::broad_queue(&request.topic);
        if let Some(peer) = self.claim_from(&broad_key, &request.user_name).await? {
            if peer.difficulty != request.difficulty {
                // Tier-2 pairs users on topic alone; difficulties differ
                info!(
                    "Broad match on '{}': {} ({}) with {} ({})",
                    request.topic, request.user_name, request.difficulty, peer.user_name, peer.difficulty
                );
            }
            return Ok(Some(peer));
        }

        self.store
            .add_to_set(&exact_key, &request.user_name, self.entry_ttl)
            .await?;
        self.store
            .add_to_set(&broad_key, &request.user_name, self.entry_ttl)
            .await?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            let waiting = self.store.set_members(&exact_key).await?;
            debug!("Queue for {} after enqueue: {:?}", exact_key, waiting);
        }

        Ok(None)
    }

    /// Pop/verify loop over one tier queue
    ///
    /// The requester's own identity is removed first so a duplicate
    /// submission cannot match with itself. Each popped identity is then
    /// claimed by atomically taking its pending entry; identities whose
    /// entry already expired or was cancelled are stale and skipped.
    async fn claim_from(&self, queue_key: &str, own_name: &str) -> Result<Option<MatchRequest>, StoreError> {
        self.store.remove_from_set(queue_key, own_name).await?;

        while let Some(candidate) = self.store.pop_from_set(queue_key).await? {
            if candidate == own_name {
                continue;
            }
            match self.store.take(&StoreKey::entry(&candidate)).await? {
                Some(json) => match serde_json::from_str::<MatchRequest>(&json) {
                    Ok(peer) => return Ok(Some(peer)),
                    Err(e) => {
                        warn!("Dropping corrupt pending entry for {}: {}", candidate, e);
                    }
                },
                None => {
                    debug!("Skipping stale queue member {} in {}", candidate, queue_key);
                }
            }
        }

        Ok(None)
    }
}
