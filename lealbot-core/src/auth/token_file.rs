// lealbot-core/src/auth/token_file.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;

use lealbot_common::models::credential::BotCredential;
use crate::Error;

/// On-disk mirror of the bot token pair. Strictly a fallback: the database is
/// the store of record, and this file is only read when no stored credential
/// is usable. Field names and the epoch-millisecond timestamp match the
/// long-standing file layout, so an existing file keeps working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch milliseconds.
    pub expires_at: i64,
    pub username: String,
}

impl TokenRecord {
    pub fn from_credential(cred: &BotCredential) -> Self {
        Self {
            access_token: cred.access_token.clone(),
            refresh_token: cred.refresh_token.clone(),
            expires_at: cred.expires_at.timestamp_millis(),
            username: cred.user_name.clone(),
        }
    }

    /// Out-of-range values decode to the minimum instant, i.e. long expired.
    pub fn expires_at_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.expires_at).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Same renewal threshold stored credentials use.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at_utc() - now < margin
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at_utc() <= now
    }
}

#[derive(Clone)]
pub struct TokenFileStore {
    path: PathBuf,
}

impl TokenFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `Ok(None)` when the file does not exist. A file that exists but does
    /// not parse is an error the caller decides how to treat.
    pub fn load(&self) -> Result<Option<TokenRecord>, Error> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let record: TokenRecord = serde_json::from_str(&raw)?;
        Ok(Some(record))
    }

    /// Writes to a temp file in the same directory, then renames over the
    /// target, so a crash mid-write never leaves a torn file behind.
    pub fn save(&self, record: &TokenRecord) -> Result<(), Error> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, record)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn sample_record() -> TokenRecord {
        TokenRecord {
            access_token: "access-abc".into(),
            refresh_token: "refresh-def".into(),
            expires_at: (Utc::now() + Duration::hours(3)).timestamp_millis(),
            username: "lealbot".into(),
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenFileStore::new(dir.path().join("token.json"));

        let record = sample_record();
        store.save(&record).unwrap();
        let loaded = store.load().unwrap().expect("file should exist");
        assert_eq!(loaded, record);
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenFileStore::new(dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "{\"accessToken\": \"trunc").unwrap();

        let store = TokenFileStore::new(path);
        assert!(store.load().is_err());
    }

    #[test]
    fn save_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenFileStore::new(dir.path().join("token.json"));

        let mut record = sample_record();
        store.save(&record).unwrap();
        record.access_token = "access-rotated".into();
        store.save(&record).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access_token, "access-rotated");
    }

    #[test]
    fn record_mirrors_credential_fields() {
        let now = Utc::now();
        let cred = BotCredential {
            credential_id: Uuid::new_v4(),
            platform_user_id: "999".into(),
            user_name: "lealbot".into(),
            access_token: "at".into(),
            refresh_token: "rt".into(),
            scopes: vec![],
            expires_at: now + Duration::hours(4),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let record = TokenRecord::from_credential(&cred);
        assert_eq!(record.username, "lealbot");
        assert_eq!(record.expires_at, cred.expires_at.timestamp_millis());
        // Millisecond precision survives the round trip.
        assert_eq!(
            record.expires_at_utc().timestamp_millis(),
            cred.expires_at.timestamp_millis()
        );
    }

    #[test]
    fn legacy_field_names_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(
            &path,
            r#"{"accessToken":"a","refreshToken":"r","expiresAt":1700000000000,"username":"bot"}"#,
        )
        .unwrap();

        let loaded = TokenFileStore::new(path).load().unwrap().unwrap();
        assert_eq!(loaded.access_token, "a");
        assert_eq!(loaded.expires_at, 1_700_000_000_000);
    }
}
