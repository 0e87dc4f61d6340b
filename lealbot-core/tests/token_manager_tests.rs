// File: lealbot-core/tests/token_manager_tests.rs
//
// Token lifecycle behavior against an in-memory credentials store and a
// mocked OAuth endpoint: proactive renewal, single-flight, terminal vs
// transient failure handling, and the file-backed fallback.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mockall::mock;
use uuid::Uuid;

use lealbot_common::models::credential::BotCredential;
use lealbot_common::traits::repository_traits::CredentialsRepository;
use lealbot_core::auth::{
    OauthClient, TokenFileStore, TokenManager, TokenRecord, TokenResponse, ValidatedIdentity,
};
use lealbot_core::Error;

#[derive(Default)]
struct MockCredentialsRepository {
    storage: std::sync::Mutex<HashMap<Uuid, BotCredential>>,
}

#[async_trait]
impl CredentialsRepository for MockCredentialsRepository {
    async fn store_credentials(&self, creds: &BotCredential) -> Result<(), Error> {
        let mut map = self.storage.lock().unwrap();
        map.retain(|_, c| c.platform_user_id != creds.platform_user_id);
        map.insert(creds.credential_id, creds.clone());
        Ok(())
    }

    async fn get_credential_by_id(
        &self,
        credential_id: Uuid,
    ) -> Result<Option<BotCredential>, Error> {
        let map = self.storage.lock().unwrap();
        Ok(map.get(&credential_id).cloned())
    }

    async fn get_credential_by_user_name(
        &self,
        user_name: &str,
    ) -> Result<Option<BotCredential>, Error> {
        let map = self.storage.lock().unwrap();
        Ok(map
            .values()
            .find(|c| c.user_name.eq_ignore_ascii_case(user_name))
            .cloned())
    }

    async fn update_credentials(&self, creds: &BotCredential) -> Result<(), Error> {
        let mut map = self.storage.lock().unwrap();
        map.insert(creds.credential_id, creds.clone());
        Ok(())
    }

    async fn list_active_credentials(&self) -> Result<Vec<BotCredential>, Error> {
        let map = self.storage.lock().unwrap();
        let mut active: Vec<BotCredential> =
            map.values().filter(|c| c.is_active).cloned().collect();
        active.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(active)
    }

    async fn get_expiring_credentials(
        &self,
        within: Duration,
    ) -> Result<Vec<BotCredential>, Error> {
        let now = Utc::now();
        let map = self.storage.lock().unwrap();
        Ok(map
            .values()
            .filter(|c| c.is_active && c.needs_refresh(now, within))
            .cloned()
            .collect())
    }

    async fn set_credential_active(
        &self,
        credential_id: Uuid,
        is_active: bool,
    ) -> Result<(), Error> {
        let mut map = self.storage.lock().unwrap();
        if let Some(cred) = map.get_mut(&credential_id) {
            cred.is_active = is_active;
        }
        Ok(())
    }
}

mock! {
    OauthApi {}

    #[async_trait]
    impl OauthClient for OauthApi {
        async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, Error>;
        async fn exchange_code(&self, code: &str) -> Result<TokenResponse, Error>;
        async fn validate(&self, access_token: &str) -> Result<ValidatedIdentity, Error>;
        fn build_authorize_url(&self, state: &str) -> String;
    }
}

fn test_credential(
    user_name: &str,
    platform_user_id: &str,
    expires_in: Duration,
    updated_secs_ago: i64,
) -> BotCredential {
    let now = Utc::now();
    BotCredential {
        credential_id: Uuid::new_v4(),
        platform_user_id: platform_user_id.to_string(),
        user_name: user_name.to_string(),
        access_token: format!("at-{user_name}"),
        refresh_token: format!("rt-{user_name}"),
        scopes: vec!["user:read:chat".to_string()],
        expires_at: now + expires_in,
        is_active: true,
        created_at: now - Duration::days(1),
        updated_at: now - Duration::seconds(updated_secs_ago),
    }
}

fn temp_token_file(dir: &tempfile::TempDir) -> TokenFileStore {
    TokenFileStore::new(dir.path().join("twitch_tokens.json"))
}

#[tokio::test]
async fn fresh_token_resolves_without_refresh() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());
    let cred = test_credential("lealbot", "111", Duration::hours(3), 0);
    repo.store_credentials(&cred).await?;

    // No expectations: any OAuth traffic fails the test.
    let oauth = MockOauthApi::new();
    let dir = tempfile::tempdir().unwrap();
    let manager = TokenManager::new(repo, Arc::new(oauth), temp_token_file(&dir), None);

    let token = manager.resolve_access_token().await?;
    assert_eq!(token.as_deref(), Some("at-lealbot"));

    let resolved = manager.resolve_credential().await?.expect("credential");
    assert_eq!(resolved.credential_id, cred.credential_id);
    assert_eq!(resolved.platform_user_id, "111");
    Ok(())
}

#[tokio::test]
async fn expiring_token_is_refreshed_and_persisted() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());
    let cred = test_credential("lealbot", "111", Duration::minutes(10), 0);
    repo.store_credentials(&cred).await?;

    let mut oauth = MockOauthApi::new();
    oauth
        .expect_refresh_token()
        .times(1)
        .returning(|_| {
            Ok(TokenResponse {
                access_token: "at-renewed".to_string(),
                refresh_token: Some("rt-rotated".to_string()),
                expires_in: 4 * 3600,
                scopes: vec!["user:read:chat".to_string(), "user:bot".to_string()],
            })
        });

    let dir = tempfile::tempdir().unwrap();
    let token_file = temp_token_file(&dir);
    let manager = TokenManager::new(
        repo.clone(),
        Arc::new(oauth),
        token_file.clone(),
        None,
    );

    let token = manager.resolve_access_token().await?;
    assert_eq!(token.as_deref(), Some("at-renewed"));

    let stored = repo
        .get_credential_by_id(cred.credential_id)
        .await?
        .expect("credential row");
    assert_eq!(stored.access_token, "at-renewed");
    assert_eq!(stored.refresh_token, "rt-rotated");
    assert_eq!(stored.scopes.len(), 2);
    assert!(stored.seconds_until_expiry(Utc::now()) > 3 * 3600);

    // The file mirror follows every successful refresh.
    let record = token_file.load()?.expect("mirrored record");
    assert_eq!(record.access_token, "at-renewed");
    assert_eq!(record.username, "lealbot");
    Ok(())
}

#[tokio::test]
async fn concurrent_resolves_share_one_refresh() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());
    let cred = test_credential("lealbot", "111", Duration::minutes(5), 0);
    repo.store_credentials(&cred).await?;

    let mut oauth = MockOauthApi::new();
    // Whoever loses the per-credential lock re-reads the renewed row and
    // must not hit the endpoint again.
    oauth
        .expect_refresh_token()
        .times(1)
        .returning(|_| {
            Ok(TokenResponse {
                access_token: "at-renewed".to_string(),
                refresh_token: None,
                expires_in: 4 * 3600,
                scopes: Vec::new(),
            })
        });

    let dir = tempfile::tempdir().unwrap();
    let manager = TokenManager::new(repo, Arc::new(oauth), temp_token_file(&dir), None);

    let m1 = manager.clone();
    let m2 = manager.clone();
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { m1.resolve_access_token().await }),
        tokio::spawn(async move { m2.resolve_access_token().await }),
    );
    let t1 = r1.unwrap()?;
    let t2 = r2.unwrap()?;
    assert_eq!(t1.as_deref(), Some("at-renewed"));
    assert_eq!(t2.as_deref(), Some("at-renewed"));
    Ok(())
}

#[tokio::test]
async fn terminal_refresh_failure_deactivates_and_tries_next() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());
    // Freshest row first in resolution order, and it is about to die.
    let dying = test_credential("lealbot", "111", Duration::minutes(5), 0);
    let spare = test_credential("lealbot_alt", "222", Duration::hours(3), 600);
    repo.store_credentials(&dying).await?;
    repo.store_credentials(&spare).await?;

    let mut oauth = MockOauthApi::new();
    oauth
        .expect_refresh_token()
        .times(1)
        .returning(|rt| {
            assert_eq!(rt, "rt-lealbot");
            Err(Error::RefreshTokenExpired(
                "token endpoint returned 400: invalid_grant".to_string(),
            ))
        });

    let dir = tempfile::tempdir().unwrap();
    let manager = TokenManager::new(repo.clone(), Arc::new(oauth), temp_token_file(&dir), None);

    let token = manager.resolve_access_token().await?;
    assert_eq!(token.as_deref(), Some("at-lealbot_alt"));

    let dead = repo
        .get_credential_by_id(dying.credential_id)
        .await?
        .expect("row survives deactivation");
    assert!(!dead.is_active);
    Ok(())
}

#[tokio::test]
async fn transient_failure_keeps_stale_token_and_active_flag() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());
    // Inside the margin but not yet past expiry.
    let cred = test_credential("lealbot", "111", Duration::minutes(10), 0);
    repo.store_credentials(&cred).await?;

    let mut oauth = MockOauthApi::new();
    oauth
        .expect_refresh_token()
        .times(1)
        .returning(|_| {
            Err(Error::Platform(
                "twitch token endpoint network error: connection refused".to_string(),
            ))
        });

    let dir = tempfile::tempdir().unwrap();
    let manager = TokenManager::new(repo.clone(), Arc::new(oauth), temp_token_file(&dir), None);

    // The stored token is still valid, so a network blip must not take the
    // bot offline.
    let token = manager.resolve_access_token().await?;
    assert_eq!(token.as_deref(), Some("at-lealbot"));

    let stored = repo
        .get_credential_by_id(cred.credential_id)
        .await?
        .expect("credential row");
    assert!(stored.is_active);
    assert_eq!(stored.access_token, "at-lealbot");
    Ok(())
}

#[tokio::test]
async fn rotation_absent_keeps_previous_refresh_token() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());
    let cred = test_credential("lealbot", "111", Duration::minutes(5), 0);
    repo.store_credentials(&cred).await?;

    let mut oauth = MockOauthApi::new();
    oauth
        .expect_refresh_token()
        .times(1)
        .returning(|_| {
            Ok(TokenResponse {
                access_token: "at-renewed".to_string(),
                refresh_token: None,
                expires_in: 3600,
                scopes: Vec::new(),
            })
        });

    let dir = tempfile::tempdir().unwrap();
    let manager = TokenManager::new(repo.clone(), Arc::new(oauth), temp_token_file(&dir), None);
    manager.resolve_access_token().await?;

    let stored = repo
        .get_credential_by_id(cred.credential_id)
        .await?
        .expect("credential row");
    assert_eq!(stored.access_token, "at-renewed");
    assert_eq!(stored.refresh_token, "rt-lealbot");
    // An empty scope list from the endpoint leaves the stored scopes alone.
    assert_eq!(stored.scopes, vec!["user:read:chat".to_string()]);
    Ok(())
}

#[tokio::test]
async fn account_filter_skips_other_accounts() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());
    let other = test_credential("someoneelse", "333", Duration::hours(3), 0);
    let wanted = test_credential("lealbot", "111", Duration::hours(3), 600);
    repo.store_credentials(&other).await?;
    repo.store_credentials(&wanted).await?;

    let oauth = MockOauthApi::new();
    let dir = tempfile::tempdir().unwrap();
    let manager = TokenManager::new(
        repo,
        Arc::new(oauth),
        temp_token_file(&dir),
        Some("LealBot".to_string()),
    );

    let resolved = manager.resolve_credential().await?.expect("credential");
    assert_eq!(resolved.user_name, "lealbot");
    Ok(())
}

#[tokio::test]
async fn file_fallback_serves_unexpired_token_when_db_is_empty() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());
    let oauth = MockOauthApi::new();

    let dir = tempfile::tempdir().unwrap();
    let token_file = temp_token_file(&dir);
    token_file.save(&TokenRecord {
        access_token: "at-from-file".to_string(),
        refresh_token: "rt-from-file".to_string(),
        expires_at: (Utc::now() + Duration::hours(1)).timestamp_millis(),
        username: "lealbot".to_string(),
    })?;

    let manager = TokenManager::new(repo, Arc::new(oauth), token_file, None);

    // The DB scan finds nothing and never reaches the file.
    assert!(manager.resolve_credential().await?.is_none());
    let token = manager.resolve_access_token().await?;
    assert_eq!(token.as_deref(), Some("at-from-file"));
    Ok(())
}

#[tokio::test]
async fn file_token_inside_margin_renews_through_endpoint() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());

    let mut oauth = MockOauthApi::new();
    oauth
        .expect_refresh_token()
        .times(1)
        .returning(|rt| {
            assert_eq!(rt, "rt-from-file");
            Ok(TokenResponse {
                access_token: "at-file-renewed".to_string(),
                refresh_token: Some("rt-file-rotated".to_string()),
                expires_in: 4 * 3600,
                scopes: Vec::new(),
            })
        });

    let dir = tempfile::tempdir().unwrap();
    let token_file = temp_token_file(&dir);
    token_file.save(&TokenRecord {
        access_token: "at-from-file".to_string(),
        refresh_token: "rt-from-file".to_string(),
        expires_at: (Utc::now() + Duration::minutes(10)).timestamp_millis(),
        username: "lealbot".to_string(),
    })?;

    let manager = TokenManager::new(repo, Arc::new(oauth), token_file.clone(), None);
    let token = manager.resolve_access_token().await?;
    assert_eq!(token.as_deref(), Some("at-file-renewed"));

    // The renewed pair replaces the file, so the rotation survives restarts.
    let record = token_file.load()?.expect("rewritten record");
    assert_eq!(record.access_token, "at-file-renewed");
    assert_eq!(record.refresh_token, "rt-file-rotated");
    assert_eq!(record.username, "lealbot");
    assert!(record.expires_at_utc() > Utc::now() + Duration::hours(3));
    Ok(())
}

#[tokio::test]
async fn expired_file_token_still_renews_through_endpoint() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());

    let mut oauth = MockOauthApi::new();
    oauth
        .expect_refresh_token()
        .times(1)
        .returning(|_| {
            Ok(TokenResponse {
                access_token: "at-file-renewed".to_string(),
                refresh_token: None,
                expires_in: 3600,
                scopes: Vec::new(),
            })
        });

    let dir = tempfile::tempdir().unwrap();
    let token_file = temp_token_file(&dir);
    token_file.save(&TokenRecord {
        access_token: "at-old".to_string(),
        refresh_token: "rt-old".to_string(),
        expires_at: (Utc::now() - Duration::minutes(5)).timestamp_millis(),
        username: "lealbot".to_string(),
    })?;

    let manager = TokenManager::new(repo, Arc::new(oauth), token_file.clone(), None);
    let token = manager.resolve_access_token().await?;
    assert_eq!(token.as_deref(), Some("at-file-renewed"));

    // Rotation absent: the previous refresh token stays on disk.
    let record = token_file.load()?.expect("rewritten record");
    assert_eq!(record.refresh_token, "rt-old");
    Ok(())
}

#[tokio::test]
async fn file_token_survives_transient_refresh_failure() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());

    let mut oauth = MockOauthApi::new();
    oauth
        .expect_refresh_token()
        .times(1)
        .returning(|_| {
            Err(Error::Platform(
                "twitch token endpoint network error: connection refused".to_string(),
            ))
        });

    let dir = tempfile::tempdir().unwrap();
    let token_file = temp_token_file(&dir);
    token_file.save(&TokenRecord {
        access_token: "at-from-file".to_string(),
        refresh_token: "rt-from-file".to_string(),
        expires_at: (Utc::now() + Duration::minutes(10)).timestamp_millis(),
        username: "lealbot".to_string(),
    })?;

    // Not yet past expiry, so a network blip serves the stored token.
    let manager = TokenManager::new(repo, Arc::new(oauth), token_file, None);
    let token = manager.resolve_access_token().await?;
    assert_eq!(token.as_deref(), Some("at-from-file"));
    Ok(())
}

#[tokio::test]
async fn dead_file_token_resolves_to_none() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());

    let mut oauth = MockOauthApi::new();
    oauth
        .expect_refresh_token()
        .times(1)
        .returning(|_| {
            Err(Error::RefreshTokenExpired(
                "token endpoint returned 400: invalid_grant".to_string(),
            ))
        });

    let dir = tempfile::tempdir().unwrap();
    let token_file = temp_token_file(&dir);
    token_file.save(&TokenRecord {
        access_token: "at-old".to_string(),
        refresh_token: "rt-old".to_string(),
        expires_at: (Utc::now() - Duration::hours(1)).timestamp_millis(),
        username: "lealbot".to_string(),
    })?;

    let manager = TokenManager::new(repo, Arc::new(oauth), token_file, None);
    assert!(manager.resolve_access_token().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn concurrent_file_fallbacks_share_one_refresh() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());

    let mut oauth = MockOauthApi::new();
    // Whoever queues behind the file renewal re-reads the rewritten file
    // and must not hit the endpoint again.
    oauth
        .expect_refresh_token()
        .times(1)
        .returning(|_| {
            Ok(TokenResponse {
                access_token: "at-file-renewed".to_string(),
                refresh_token: Some("rt-file-rotated".to_string()),
                expires_in: 4 * 3600,
                scopes: Vec::new(),
            })
        });

    let dir = tempfile::tempdir().unwrap();
    let token_file = temp_token_file(&dir);
    token_file.save(&TokenRecord {
        access_token: "at-from-file".to_string(),
        refresh_token: "rt-from-file".to_string(),
        expires_at: (Utc::now() + Duration::minutes(10)).timestamp_millis(),
        username: "lealbot".to_string(),
    })?;

    let manager = TokenManager::new(repo, Arc::new(oauth), token_file, None);
    let m1 = manager.clone();
    let m2 = manager.clone();
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { m1.resolve_access_token().await }),
        tokio::spawn(async move { m2.resolve_access_token().await }),
    );
    assert_eq!(r1.unwrap()?.as_deref(), Some("at-file-renewed"));
    assert_eq!(r2.unwrap()?.as_deref(), Some("at-file-renewed"));
    Ok(())
}

#[tokio::test]
async fn sweep_refreshes_only_credentials_inside_the_margin() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());
    let expiring = test_credential("lealbot", "111", Duration::minutes(10), 0);
    let healthy = test_credential("lealbot_alt", "222", Duration::hours(3), 0);
    repo.store_credentials(&expiring).await?;
    repo.store_credentials(&healthy).await?;

    let mut oauth = MockOauthApi::new();
    oauth
        .expect_refresh_token()
        .times(1)
        .returning(|rt| {
            assert_eq!(rt, "rt-lealbot");
            Ok(TokenResponse {
                access_token: "at-renewed".to_string(),
                refresh_token: Some("rt-renewed".to_string()),
                expires_in: 4 * 3600,
                scopes: Vec::new(),
            })
        });

    let dir = tempfile::tempdir().unwrap();
    let manager = TokenManager::new(repo.clone(), Arc::new(oauth), temp_token_file(&dir), None);

    let refreshed = manager.sweep_once().await?;
    assert_eq!(refreshed, 1);

    let renewed = repo
        .get_credential_by_id(expiring.credential_id)
        .await?
        .expect("credential row");
    assert_eq!(renewed.access_token, "at-renewed");

    let untouched = repo
        .get_credential_by_id(healthy.credential_id)
        .await?
        .expect("credential row");
    assert_eq!(untouched.access_token, "at-lealbot_alt");

    // Nothing left inside the margin after the pass.
    assert_eq!(manager.sweep_once().await?, 0);
    Ok(())
}

#[tokio::test]
async fn sweep_continues_past_individual_failures() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());
    let broken = test_credential("brokenbot", "333", Duration::minutes(5), 0);
    let fine = test_credential("lealbot", "111", Duration::minutes(5), 600);
    repo.store_credentials(&broken).await?;
    repo.store_credentials(&fine).await?;

    let mut oauth = MockOauthApi::new();
    oauth
        .expect_refresh_token()
        .times(2)
        .returning(|rt| {
            if rt == "rt-brokenbot" {
                Err(Error::RefreshTokenExpired(
                    "token endpoint returned 400: invalid_grant".to_string(),
                ))
            } else {
                Ok(TokenResponse {
                    access_token: "at-renewed".to_string(),
                    refresh_token: None,
                    expires_in: 4 * 3600,
                    scopes: Vec::new(),
                })
            }
        });

    let dir = tempfile::tempdir().unwrap();
    let manager = TokenManager::new(repo.clone(), Arc::new(oauth), temp_token_file(&dir), None);

    let refreshed = manager.sweep_once().await?;
    assert_eq!(refreshed, 1);

    let dead = repo
        .get_credential_by_id(broken.credential_id)
        .await?
        .expect("row survives deactivation");
    assert!(!dead.is_active);
    Ok(())
}

#[tokio::test]
async fn custom_safety_margin_widens_the_refresh_window() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());
    // Outside the default 45 minutes, inside a 2 hour margin.
    let cred = test_credential("lealbot", "111", Duration::minutes(90), 0);
    repo.store_credentials(&cred).await?;

    let mut oauth = MockOauthApi::new();
    oauth
        .expect_refresh_token()
        .times(1)
        .returning(|_| {
            Ok(TokenResponse {
                access_token: "at-renewed".to_string(),
                refresh_token: None,
                expires_in: 4 * 3600,
                scopes: Vec::new(),
            })
        });

    let dir = tempfile::tempdir().unwrap();
    let manager = TokenManager::new(repo, Arc::new(oauth), temp_token_file(&dir), None)
        .with_safety_margin(Duration::hours(2));
    assert_eq!(manager.safety_margin(), Duration::hours(2));

    let token = manager.resolve_access_token().await?;
    assert_eq!(token.as_deref(), Some("at-renewed"));
    Ok(())
}

#[tokio::test]
async fn complete_authorization_stores_credential_and_seeds_mirror() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());

    let mut oauth = MockOauthApi::new();
    oauth
        .expect_exchange_code()
        .times(1)
        .returning(|code| {
            assert_eq!(code, "authcode-123");
            Ok(TokenResponse {
                access_token: "at-new".to_string(),
                refresh_token: Some("rt-new".to_string()),
                expires_in: 14400,
                scopes: vec!["user:read:chat".to_string(), "channel:manage:vips".to_string()],
            })
        });
    oauth
        .expect_validate()
        .times(1)
        .returning(|at| {
            assert_eq!(at, "at-new");
            Ok(ValidatedIdentity {
                login: "lealbot".to_string(),
                user_id: "424242".to_string(),
            })
        });

    let dir = tempfile::tempdir().unwrap();
    let token_file = temp_token_file(&dir);
    let manager = TokenManager::new(repo.clone(), Arc::new(oauth), token_file.clone(), None);

    let cred = manager.complete_authorization("authcode-123").await?;
    assert_eq!(cred.user_name, "lealbot");
    assert_eq!(cred.platform_user_id, "424242");
    assert!(cred.is_active);

    let stored = repo
        .get_credential_by_user_name("lealbot")
        .await?
        .expect("stored credential");
    assert_eq!(stored.access_token, "at-new");
    assert_eq!(stored.refresh_token, "rt-new");

    let record = token_file.load()?.expect("seeded mirror");
    assert_eq!(record.access_token, "at-new");
    Ok(())
}

#[tokio::test]
async fn exchange_without_refresh_token_is_rejected() -> Result<(), Error> {
    let repo = Arc::new(MockCredentialsRepository::default());

    let mut oauth = MockOauthApi::new();
    oauth
        .expect_exchange_code()
        .times(1)
        .returning(|_| {
            Ok(TokenResponse {
                access_token: "at-new".to_string(),
                refresh_token: None,
                expires_in: 14400,
                scopes: Vec::new(),
            })
        });
    oauth
        .expect_validate()
        .times(1)
        .returning(|_| {
            Ok(ValidatedIdentity {
                login: "lealbot".to_string(),
                user_id: "424242".to_string(),
            })
        });

    let dir = tempfile::tempdir().unwrap();
    let manager = TokenManager::new(repo.clone(), Arc::new(oauth), temp_token_file(&dir), None);

    let res = manager.complete_authorization("authcode-123").await;
    assert!(matches!(res, Err(Error::Auth(_))));
    assert!(repo.get_credential_by_user_name("lealbot").await?.is_none());
    Ok(())
}
