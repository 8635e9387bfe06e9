// Core engine exports
pub mod engine;
pub mod resolver;
pub mod timeout;

pub use engine::{EngineError, MatchEngine};
pub use resolver::QueueResolver;
pub use timeout::TimeoutSupervisor;
