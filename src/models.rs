use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One user's photo contribution to an event's memory wall.
///
/// Keyed by (event_id, user_id): a user posts at most one memory per
/// event. Immutable after creation except for the upvote fields and
/// `updated_at_ms`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Memory {
    pub event_id: String,
    pub user_id: String,
    pub description: String,
    pub image_url: String,
    pub upvote_count: u32,
    /// Voter ids; `upvote_count` equals its length after every commit.
    pub upvoted_by: Vec<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// Input for memory creation; counters and timestamps are assigned by
/// the repository at write time.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub event_id: String,
    pub user_id: String,
    pub description: String,
    pub image_url: String,
}

/// Denormalized per-user aggregate: the sum of `upvote_count` over all
/// memories the user owns, maintained by the toggle transaction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub user_id: String,
    pub total_upvotes_received: u64,
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
