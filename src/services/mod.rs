// Service exports
pub mod notify;
pub mod queue;
pub mod store;

pub use notify::{ChannelNotifier, Notifier, NotifyError, RedisNotifier};
pub use queue::{IntakeQueue, QueueError};
pub use store::{MemoryStore, RedisStore, RequestStore, StoreError, StoreKey};
