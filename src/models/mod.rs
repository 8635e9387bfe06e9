// Model exports
pub mod domain;
pub mod messages;

pub use domain::{Difficulty, MatchRequest, Notification};
pub use messages::IntakeMessage;
