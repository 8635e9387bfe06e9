//! PairUp Match - Real-time matchmaking engine for the PairUp platform
//!
//! This library pairs two waiting users who want to collaborate on a coding
//! problem of a given topic and difficulty. Matching runs over a shared
//! request store in two tiers: exact (topic and difficulty) first, then
//! topic alone. Requests that stay unmatched expire after a bounded wait.

pub mod config;
pub mod core;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use self::core::{EngineError, MatchEngine, QueueResolver, TimeoutSupervisor};
pub use models::{Difficulty, IntakeMessage, MatchRequest, Notification};
pub use services::{
    ChannelNotifier, IntakeQueue, MemoryStore, Notifier, RedisNotifier, RedisStore, RequestStore,
    StoreKey,
};
