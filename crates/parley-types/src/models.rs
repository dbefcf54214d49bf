use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted chat message.
///
/// `sender` is a denormalized display name, not a user id: a later rename
/// must not retroactively relabel old messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
