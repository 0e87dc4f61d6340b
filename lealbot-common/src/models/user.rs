use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A channel viewer known to the points system. `points` is the cached
/// balance; it is only ever written in the same transaction as a matching
/// ledger entry, so it always equals the sum of the user's ledger deltas.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct User {
    pub user_id: Uuid,
    /// The platform's own id for this viewer; stable across renames.
    pub platform_user_id: String,
    pub username: String,
    pub points: i64,
    pub is_vip: bool,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl User {
    pub fn new(platform_user_id: &str, username: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            platform_user_id: platform_user_id.to_string(),
            username: username.to_string(),
            points: 0,
            is_vip: false,
            created_at: now,
            last_seen: now,
        }
    }
}
