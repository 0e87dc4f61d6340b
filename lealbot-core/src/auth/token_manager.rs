// =============================================================================
// lealbot-core/src/auth/token_manager.rs
// =============================================================================
//
// Keeps the bot account's OAuth tokens continuously usable: proactive renewal
// ahead of expiry, per-credential single-flight so concurrent callers produce
// one network refresh, terminal-failure deactivation, and a file-backed
// fallback for when the database has nothing to offer.

use std::sync::Arc;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use lealbot_common::models::credential::BotCredential;
use lealbot_common::traits::repository_traits::CredentialsRepository;
use crate::auth::{OauthClient, TokenFileStore, TokenRecord};
use crate::Error;

/// Lead time before expiry at which a token is proactively renewed. Tokens
/// returned to callers are therefore always valid for at least this long.
pub const DEFAULT_SAFETY_MARGIN_MINUTES: i64 = 45;

#[derive(Clone)]
pub struct TokenManager {
    creds_repo: Arc<dyn CredentialsRepository>,
    oauth: Arc<dyn OauthClient>,
    token_file: TokenFileStore,
    refresh_locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
    /// The file holds a single record, so one lock serializes its renewals.
    file_lock: Arc<Mutex<()>>,
    safety_margin: Duration,
    /// When set, resolution only considers this bot account (by login name).
    account_filter: Option<String>,
}

impl TokenManager {
    pub fn new(
        creds_repo: Arc<dyn CredentialsRepository>,
        oauth: Arc<dyn OauthClient>,
        token_file: TokenFileStore,
        account_filter: Option<String>,
    ) -> Self {
        Self {
            creds_repo,
            oauth,
            token_file,
            refresh_locks: Arc::new(DashMap::new()),
            file_lock: Arc::new(Mutex::new(())),
            safety_margin: Duration::minutes(DEFAULT_SAFETY_MARGIN_MINUTES),
            account_filter,
        }
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    /// Returns an access token that is valid now and, unless every renewal
    /// path failed, for at least the safety margin.
    ///
    /// The database scan happens in [`resolve_credential`]; when it yields
    /// nothing usable, the file mirror is consulted last. `Ok(None)` means
    /// the bot currently has no credential and an operator must re-authorize.
    ///
    /// [`resolve_credential`]: TokenManager::resolve_credential
    pub async fn resolve_access_token(&self) -> Result<Option<String>, Error> {
        if let Some(cred) = self.resolve_credential().await? {
            return Ok(Some(cred.access_token));
        }
        self.resolve_from_file(Utc::now()).await
    }

    /// Returns a stored credential whose access token is valid now and,
    /// unless every renewal path failed, for at least the safety margin.
    ///
    /// Scans active credentials most recently updated first. Each candidate
    /// is returned as-is while it is outside the margin, refreshed when
    /// inside it. A terminal refresh failure deactivates the candidate and
    /// moves on; a transient failure falls back to the stored token as long
    /// as it has not hard-expired. Callers that only need the token string
    /// should use [`resolve_access_token`], which adds the file fallback.
    ///
    /// [`resolve_access_token`]: TokenManager::resolve_access_token
    pub async fn resolve_credential(&self) -> Result<Option<BotCredential>, Error> {
        let now = Utc::now();
        let mut candidates = self.creds_repo.list_active_credentials().await?;
        if let Some(filter) = &self.account_filter {
            candidates.retain(|c| c.user_name.eq_ignore_ascii_case(filter));
        }

        for cred in candidates {
            if !cred.needs_refresh(now, self.safety_margin) {
                return Ok(Some(cred));
            }

            match self.refresh_credential(&cred).await {
                Ok(updated) => return Ok(Some(updated)),
                Err(Error::RefreshTokenExpired(msg)) => {
                    // Already deactivated by refresh_credential; try the next
                    // candidate.
                    warn!(
                        "Credential for '{}' is terminally dead ({}); trying next candidate",
                        cred.user_name, msg
                    );
                    continue;
                }
                Err(e) => {
                    warn!(
                        "Transient refresh failure for '{}': {:?}",
                        cred.user_name, e
                    );
                    if !cred.is_expired(now) {
                        // Inside the margin but not yet expired: still valid,
                        // renewal is retried on the next sweep or resolve.
                        return Ok(Some(cred));
                    }
                    continue;
                }
            }
        }

        Ok(None)
    }

    /// Last-resort fallback: the file record is held to the same renewal
    /// margin as stored credentials and renewed through the same endpoint,
    /// with the renewed pair written back so restarts keep the rotation.
    async fn resolve_from_file(&self, now: chrono::DateTime<Utc>) -> Result<Option<String>, Error> {
        // One renewal in flight at a time. Whoever queues behind it re-reads
        // the rewritten file and serves the fresh token without a second
        // network call.
        let _guard = self.file_lock.lock().await;

        let record = match self.token_file.load() {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("Token file fallback unreadable: {:?}", e);
                return Ok(None);
            }
        };

        if !record.needs_refresh(now, self.safety_margin) {
            warn!(
                "No usable stored credential; falling back to file token for '{}'",
                record.username
            );
            return Ok(Some(record.access_token));
        }

        debug!(
            "File token for '{}' is inside the renewal margin; refreshing",
            record.username
        );
        match self.oauth.refresh_token(&record.refresh_token).await {
            Ok(resp) => {
                let refresh_token = match resp.refresh_token {
                    Some(rotated) => rotated,
                    None => {
                        debug!("Token endpoint did not rotate the refresh token");
                        record.refresh_token
                    }
                };
                let renewed = TokenRecord {
                    access_token: resp.access_token,
                    refresh_token,
                    expires_at: (now + Duration::seconds(resp.expires_in as i64))
                        .timestamp_millis(),
                    username: record.username,
                };
                if let Err(e) = self.token_file.save(&renewed) {
                    warn!("Failed to persist renewed file token: {:?}", e);
                }
                info!(
                    "Refreshed file-backed token for '{}', now valid until {}",
                    renewed.username,
                    renewed.expires_at_utc()
                );
                Ok(Some(renewed.access_token))
            }
            Err(Error::RefreshTokenExpired(msg)) => {
                error!(
                    "File token for '{}' rejected terminally: {}; re-authorization required",
                    record.username, msg
                );
                Ok(None)
            }
            Err(e) => {
                warn!(
                    "Transient refresh failure for file token '{}': {:?}",
                    record.username, e
                );
                if !record.is_expired(now) {
                    // Still valid until its actual expiry; renewal is retried
                    // on the next resolve.
                    return Ok(Some(record.access_token));
                }
                Ok(None)
            }
        }
    }

    /// Refreshes one credential against the token endpoint and persists the
    /// outcome. Single-flight per credential id: concurrent callers queue on
    /// a lock, and whoever enters second re-reads the row and skips the
    /// network round trip if the first caller already renewed it.
    pub async fn refresh_credential(&self, cred: &BotCredential) -> Result<BotCredential, Error> {
        let lock = self
            .refresh_locks
            .entry(cred.credential_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let current = self
            .creds_repo
            .get_credential_by_id(cred.credential_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("credential {}", cred.credential_id)))?;

        if !current.is_active {
            return Err(Error::RefreshTokenExpired(
                "credential was deactivated".to_string(),
            ));
        }
        if !current.needs_refresh(Utc::now(), self.safety_margin) {
            debug!(
                "Credential for '{}' already renewed by a concurrent caller",
                current.user_name
            );
            return Ok(current);
        }

        match self.oauth.refresh_token(&current.refresh_token).await {
            Ok(resp) => {
                let now = Utc::now();
                let mut updated = current;
                updated.access_token = resp.access_token;
                match resp.refresh_token {
                    Some(rotated) => updated.refresh_token = rotated,
                    // Rotation is optional server-side (RFC 6749); keep the
                    // previous refresh token.
                    None => debug!("Token endpoint did not rotate the refresh token"),
                }
                if !resp.scopes.is_empty() {
                    updated.scopes = resp.scopes;
                }
                updated.expires_at = now + Duration::seconds(resp.expires_in as i64);
                updated.updated_at = now;

                self.creds_repo.update_credentials(&updated).await?;

                // Best effort only. A dead mirror must never fail a refresh
                // that already persisted.
                if let Err(e) = self.token_file.save(&TokenRecord::from_credential(&updated)) {
                    warn!("Failed to mirror refreshed token to file: {:?}", e);
                }

                info!(
                    "Refreshed token for '{}', now valid until {}",
                    updated.user_name, updated.expires_at
                );
                Ok(updated)
            }
            Err(Error::RefreshTokenExpired(msg)) => {
                error!(
                    "Refresh token for '{}' rejected terminally: {}; deactivating credential",
                    cred.user_name, msg
                );
                self.creds_repo
                    .set_credential_active(cred.credential_id, false)
                    .await?;
                Err(Error::RefreshTokenExpired(msg))
            }
            Err(e) => Err(e),
        }
    }

    /// One pass of the background renewal: refresh every active credential
    /// already inside the safety margin. Per-credential failures are logged
    /// and never abort the pass. Returns how many credentials were renewed.
    pub async fn sweep_once(&self) -> Result<usize, Error> {
        let expiring = self
            .creds_repo
            .get_expiring_credentials(self.safety_margin)
            .await?;

        if expiring.is_empty() {
            debug!("Token sweep: nothing inside the safety margin");
            return Ok(0);
        }

        info!(
            "Token sweep: {} credential(s) inside the safety margin",
            expiring.len()
        );
        let mut refreshed = 0;
        for cred in expiring {
            match self.refresh_credential(&cred).await {
                Ok(_) => refreshed += 1,
                Err(e) => {
                    error!(
                        "Sweep failed to refresh credential for '{}': {:?}",
                        cred.user_name, e
                    );
                }
            }
        }
        Ok(refreshed)
    }

    /// Finishes the consent flow: exchanges the authorization code, asks the
    /// platform who the token belongs to, stores the credential (replacing
    /// any previous row for the same account), and seeds the file mirror.
    pub async fn complete_authorization(&self, code: &str) -> Result<BotCredential, Error> {
        let resp = self.oauth.exchange_code(code).await?;
        let identity = self.oauth.validate(&resp.access_token).await?;

        let refresh_token = resp.refresh_token.ok_or_else(|| {
            Error::Auth("token endpoint returned no refresh token for the code exchange".into())
        })?;

        let now = Utc::now();
        let credential = BotCredential {
            credential_id: Uuid::new_v4(),
            platform_user_id: identity.user_id,
            user_name: identity.login,
            access_token: resp.access_token,
            refresh_token,
            scopes: resp.scopes,
            expires_at: now + Duration::seconds(resp.expires_in as i64),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.creds_repo.store_credentials(&credential).await?;
        if let Err(e) = self.token_file.save(&TokenRecord::from_credential(&credential)) {
            warn!("Failed to seed token file mirror: {:?}", e);
        }

        info!(
            "Authorized bot account '{}' (platform id {})",
            credential.user_name, credential.platform_user_id
        );
        Ok(credential)
    }
}
