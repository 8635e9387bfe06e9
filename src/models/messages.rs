use serde::{Deserialize, Serialize};

use crate::models::domain::MatchRequest;

/// Envelope for messages consumed from the intake channel
///
/// Producers publish one JSON object per operation, tagged by `action`:
///
/// ```json
/// {"action":"submit","userName":"alice","topic":"arrays","difficulty":"Easy"}
/// {"action":"cancel","userName":"alice"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum IntakeMessage {
    Submit {
        #[serde(flatten)]
        request: MatchRequest,
    },
    Cancel {
        #[serde(rename = "userName")]
        user_name: String,
    },
}
