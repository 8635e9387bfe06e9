use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::models::Difficulty;

/// Errors that can occur with request store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Shared substrate holding pending entries and tier queues
///
/// Every destructive read (`take`, `pop_from_set`) is a single atomic
/// operation against the store, so concurrent workers can never both claim
/// the same waiting identity. "Already gone" is a normal outcome for every
/// delete-shaped call, never an error.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Set a scalar value with a bounded TTL
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Read a scalar value, if present
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Atomically read and delete a scalar value (GETDEL)
    async fn take(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete a key; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Add a member to a set and refresh the set's TTL
    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Remove a member from a set, if present
    async fn remove_from_set(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Atomically remove and return an arbitrary member of a set
    async fn pop_from_set(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Enumerate set members. Diagnostics only, not part of the matching path.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;
}

/// Key builder for the store's key families
pub struct StoreKey;

impl StoreKey {
    /// Pending entry for a waiting request
    pub fn entry(user_name: &str) -> String {
        format!("match_request:{}", user_name)
    }

    /// EXACT tier queue, keyed by topic and difficulty
    pub fn exact_queue(topic: &str, difficulty: Difficulty) -> String {
        format!("match_queue:topic:{}:difficulty:{}", topic, difficulty)
    }

    /// BROAD tier queue, keyed by topic alone
    pub fn broad_queue(topic: &str) -> String {
        format!("match_queue:topic:{}", topic)
    }

    /// Cancellation marker checked by expiry timers
    pub fn cancelled(user_name: &str) -> String {
        format!("cancelled:{}", user_name)
    }
}

/// Redis-backed request store shared across worker processes
pub struct RedisStore {
    // Store ConnectionManager in a Mutex for interior mutability
    redis: Arc<tokio::sync::Mutex<ConnectionManager>>,
}

impl RedisStore {
    /// Connect to Redis and build a store
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let redis = redis::aio::ConnectionManager::new(client).await?;

        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(redis)),
        })
    }
}

#[async_trait]
impl RequestStore for RedisStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.redis.lock().await;
        redis::cmd("SETEX")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .arg(value)
            .query_async::<()>(&mut *conn)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.redis.lock().await;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut *conn).await?;
        Ok(value)
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.redis.lock().await;
        let value: Option<String> = redis::cmd("GETDEL").arg(key).query_async(&mut *conn).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.redis.lock().await;
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut *conn).await?;
        Ok(removed > 0)
    }

    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.redis.lock().await;
        redis::cmd("SADD")
            .arg(key)
            .arg(member)
            .query_async::<()>(&mut *conn)
            .await?;
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut *conn)
            .await?;
        Ok(())
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.redis.lock().await;
        redis::cmd("SREM")
            .arg(key)
            .arg(member)
            .query_async::<()>(&mut *conn)
            .await?;
        Ok(())
    }

    async fn pop_from_set(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.redis.lock().await;
        let member: Option<String> = redis::cmd("SPOP").arg(key).query_async(&mut *conn).await?;
        Ok(member)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.redis.lock().await;
        let members: Vec<String> = redis::cmd("SMEMBERS").arg(key).query_async(&mut *conn).await?;
        Ok(members)
    }
}

enum MemoryValue {
    Scalar(String),
    Set(HashSet<String>),
}

struct MemoryEntry {
    value: MemoryValue,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// In-process request store for tests and single-process embedding
///
/// A single async mutex over the whole map gives every operation the same
/// at-most-one-claim guarantee the Redis primitives provide. Expiry is
/// lazy: entries past their deadline are dropped on first access, which is
/// indistinguishable from eager expiry to callers.
#[derive(Default)]
pub struct MemoryStore {
    inner: tokio::sync::Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn live<'a>(
    map: &'a mut HashMap<String, MemoryEntry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut MemoryEntry> {
    if map.get(key).map(|e| e.is_expired(now)).unwrap_or(false) {
        map.remove(key);
    }
    map.get_mut(key)
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut map = self.inner.lock().await;
        map.insert(
            key.to_string(),
            MemoryEntry {
                value: MemoryValue::Scalar(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut map = self.inner.lock().await;
        match live(&mut map, key, Instant::now()).map(|e| &e.value) {
            Some(MemoryValue::Scalar(v)) => Ok(Some(v.clone())),
            _ => Ok(None),
        }
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut map = self.inner.lock().await;
        if live(&mut map, key, Instant::now()).is_none() {
            return Ok(None);
        }
        match map.remove(key).map(|e| e.value) {
            Some(MemoryValue::Scalar(v)) => Ok(Some(v)),
            _ => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut map = self.inner.lock().await;
        let existed = live(&mut map, key, Instant::now()).is_some();
        map.remove(key);
        Ok(existed)
    }

    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut map = self.inner.lock().await;
        let now = Instant::now();
        // Drop an expired set before inserting into it
        live(&mut map, key, now);
        let entry = map.entry(key.to_string()).or_insert_with(|| MemoryEntry {
            value: MemoryValue::Set(HashSet::new()),
            expires_at: None,
        });
        if !matches!(entry.value, MemoryValue::Set(_)) {
            entry.value = MemoryValue::Set(HashSet::new());
        }
        if let MemoryValue::Set(members) = &mut entry.value {
            members.insert(member.to_string());
        }
        entry.expires_at = Some(now + ttl);
        Ok(())
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut map = self.inner.lock().await;
        let mut empty = false;
        if let Some(entry) = live(&mut map, key, Instant::now()) {
            if let MemoryValue::Set(members) = &mut entry.value {
                members.remove(member);
                empty = members.is_empty();
            }
        }
        // Redis drops a set key once its last member is removed
        if empty {
            map.remove(key);
        }
        Ok(())
    }

    async fn pop_from_set(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut map = self.inner.lock().await;
        let mut popped = None;
        let mut empty = false;
        if let Some(entry) = live(&mut map, key, Instant::now()) {
            if let MemoryValue::Set(members) = &mut entry.value {
                popped = members.iter().next().cloned();
                if let Some(member) = &popped {
                    members.remove(member);
                }
                empty = members.is_empty();
            }
        }
        if empty {
            map.remove(key);
        }
        Ok(popped)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut map = self.inner.lock().await;
        match live(&mut map, key, Instant::now()).map(|e| &e.value) {
            Some(MemoryValue::Set(members)) => Ok(members.iter().cloned().collect()),
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(31);

    #[test]
    fn test_store_key_builder() {
        assert_eq!(StoreKey::entry("alice"), "match_request:alice");
        assert_eq!(
            StoreKey::exact_queue("arrays", Difficulty::Easy),
            "match_queue:topic:arrays:difficulty:Easy"
        );
        assert_eq!(StoreKey::broad_queue("arrays"), "match_queue:topic:arrays");
        assert_eq!(StoreKey::cancelled("alice"), "cancelled:alice");
    }

    #[tokio::test]
    async fn test_memory_scalar_roundtrip() {
        let store = MemoryStore::new();
        store.set_with_ttl("k", "v", TTL).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_take_is_destructive() {
        let store = MemoryStore::new();
        store.set_with_ttl("k", "v", TTL).await.unwrap();
        assert_eq!(store.take("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.take("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_scalar_expires() {
        let store = MemoryStore::new();
        store.set_with_ttl("k", "v", Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.take("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_set_pop_claims_each_member_once() {
        let store = MemoryStore::new();
        store.add_to_set("q", "a", TTL).await.unwrap();
        store.add_to_set("q", "b", TTL).await.unwrap();

        let first = store.pop_from_set("q").await.unwrap().unwrap();
        let second = store.pop_from_set("q").await.unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(store.pop_from_set("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_set_removed_when_empty() {
        let store = MemoryStore::new();
        store.add_to_set("q", "a", TTL).await.unwrap();
        store.remove_from_set("q", "a").await.unwrap();
        assert!(store.set_members("q").await.unwrap().is_empty());

        // Removing from a missing set is a no-op
        store.remove_from_set("q", "ghost").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_set_ttl_refreshed_on_add() {
        let store = MemoryStore::new();
        store.add_to_set("q", "a", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        store.add_to_set("q", "b", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        let mut members = store.set_members("q").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a", "b"]);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(store.set_members("q").await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_redis_store_roundtrip() {
        let store = RedisStore::connect("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");

        store.set_with_ttl("pairup_test:k", "v", TTL).await.unwrap();
        assert_eq!(store.get("pairup_test:k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.take("pairup_test:k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.get("pairup_test:k").await.unwrap(), None);

        store.add_to_set("pairup_test:q", "a", TTL).await.unwrap();
        assert_eq!(store.pop_from_set("pairup_test:q").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.pop_from_set("pairup_test:q").await.unwrap(), None);
    }
}
