// File: lealbot-common/src/models/credential.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The bot account's OAuth token pair plus bookkeeping. There is normally one
/// row per authorized bot account (unique on `platform_user_id`), and the
/// freshest `updated_at` wins when several are active.
///
/// `access_token` and `refresh_token` are encrypted at rest; the repository
/// decrypts on read, so instances of this struct always hold plaintext.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct BotCredential {
    pub credential_id: Uuid,
    /// The platform's own id for the bot account (e.g. a Twitch user id).
    pub platform_user_id: String,
    pub user_name: String,
    pub access_token: String,
    pub refresh_token: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    /// Flipped off on terminal refresh failure; inactive credentials are
    /// never resolution candidates until re-authorized.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BotCredential {
    /// Seconds until the access token expires. Negative once past expiry.
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds()
    }

    /// True when the token's remaining lifetime has fallen inside the given
    /// safety margin and a proactive refresh is due.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - now < margin
    }

    /// True once the token is past its actual expiry instant (not merely
    /// inside the margin).
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential_expiring_in(secs: i64) -> BotCredential {
        let now = Utc::now();
        BotCredential {
            credential_id: Uuid::new_v4(),
            platform_user_id: "12345".to_string(),
            user_name: "lealbot".to_string(),
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            scopes: vec!["chat:read".to_string()],
            expires_at: now + Duration::seconds(secs),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn needs_refresh_inside_margin() {
        let cred = credential_expiring_in(30 * 60);
        let now = Utc::now();
        assert!(cred.needs_refresh(now, Duration::minutes(45)));
        assert!(!cred.is_expired(now));
    }

    #[test]
    fn no_refresh_outside_margin() {
        let cred = credential_expiring_in(2 * 60 * 60);
        let now = Utc::now();
        assert!(!cred.needs_refresh(now, Duration::minutes(45)));
    }

    #[test]
    fn expired_token_also_needs_refresh() {
        let cred = credential_expiring_in(-10);
        let now = Utc::now();
        assert!(cred.is_expired(now));
        assert!(cred.needs_refresh(now, Duration::minutes(45)));
    }
}
