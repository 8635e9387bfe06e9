use serde::{Deserialize, Serialize};
use validator::Validate;

/// Difficulty tier a user declares for their session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        };
        f.write_str(s)
    }
}

/// A user's request to be paired for a collaborative coding session
///
/// Immutable once created. While the request waits for a peer it is
/// persisted as a pending entry in the request store, serialized as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MatchRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "user_name", rename = "userName")]
    pub user_name: String,
    #[validate(length(min = 1))]
    pub topic: String,
    pub difficulty: Difficulty,
    #[serde(rename = "submittedAt", default = "chrono::Utc::now")]
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

impl MatchRequest {
    pub fn new(user_name: impl Into<String>, topic: impl Into<String>, difficulty: Difficulty) -> Self {
        Self {
            user_name: user_name.into(),
            topic: topic.into(),
            difficulty,
            submitted_at: chrono::Utc::now(),
        }
    }
}

/// Terminal outcome delivered to a user through the notification sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    MatchFound {
        #[serde(rename = "matchUserName")]
        match_user_name: String,
    },
    NotFound,
    Cancelled,
}

impl Notification {
    pub fn match_found(peer: &str) -> Self {
        Notification::MatchFound {
            match_user_name: peer.to_string(),
        }
    }
}
