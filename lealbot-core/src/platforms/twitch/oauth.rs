// File: lealbot-core/src/platforms/twitch/oauth.rs
//
// Twitch id-service client: token refresh, code exchange, /validate lookups
// and the authorize-URL builder used by the consent flow.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::{OauthClient, TokenResponse, ValidatedIdentity};
use crate::Error;

const DEFAULT_AUTH_BASE: &str = "https://id.twitch.tv";
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Scopes requested for the bot account. Chat write for shop announcements,
/// VIP management for the vip perk offers.
const REQUESTED_SCOPES: &[&str] = &[
    "user:read:chat",
    "user:write:chat",
    "user:bot",
    "channel:manage:vips",
];

#[derive(Deserialize)]
struct TwitchTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: u64,
    scope: Option<Vec<String>>,
    #[allow(dead_code)]
    token_type: String,
}

/// For /validate
#[derive(Deserialize)]
struct TwitchValidateResponse {
    #[allow(dead_code)]
    client_id: String,
    login: String,
    user_id: String,
    #[allow(dead_code)]
    expires_in: u64,
}

pub struct TwitchOauthClient {
    http: ReqwestClient,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_base: String,
}

impl TwitchOauthClient {
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Result<Self, Error> {
        let http = ReqwestClient::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Platform(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            client_id,
            client_secret,
            redirect_uri,
            auth_base: DEFAULT_AUTH_BASE.to_string(),
        })
    }

    /// Point the client at a different id service, for tests and staging.
    pub fn with_auth_base(mut self, base: impl Into<String>) -> Self {
        self.auth_base = base.into();
        self
    }

    fn token_url(&self) -> String {
        format!("{}/oauth2/token", self.auth_base)
    }

    async fn post_token_request(
        &self,
        params: &[(&str, &str)],
    ) -> Result<reqwest::Response, Error> {
        self.http
            .post(self.token_url())
            .form(params)
            .send()
            .await
            .map_err(|e| Error::Platform(format!("token endpoint network error: {e}")))
    }
}

#[async_trait]
impl OauthClient for TwitchOauthClient {
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, Error> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let resp = self.post_token_request(&params).await?;
        let status = resp.status();

        // 400/401 means the refresh token itself was rejected (revoked,
        // consumed under rotation, or the user disconnected the app). That
        // is unrecoverable without a new consent flow.
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let body = resp.text().await.unwrap_or_default();
            warn!("token refresh rejected => status={} body={}", status, body);
            return Err(Error::RefreshTokenExpired(format!(
                "token endpoint returned {status}: {body}"
            )));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("token refresh failed => status={} body={}", status, body);
            return Err(Error::Platform(format!(
                "token endpoint: HTTP {status} => {body}"
            )));
        }

        let parsed: TwitchTokenResponse = resp
            .json()
            .await
            .map_err(|e| Error::Platform(format!("token endpoint parse error: {e}")))?;

        debug!(
            "token refresh succeeded => expires_in={}s rotated={}",
            parsed.expires_in,
            parsed.refresh_token.is_some()
        );

        Ok(TokenResponse {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token,
            expires_in: parsed.expires_in,
            scopes: parsed.scope.unwrap_or_default(),
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, Error> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let resp = self.post_token_request(&params).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("code exchange failed => status={} body={}", status, body);
            return Err(Error::Auth(format!(
                "code exchange: HTTP {status} => {body}"
            )));
        }

        let parsed: TwitchTokenResponse = resp
            .json()
            .await
            .map_err(|e| Error::Auth(format!("code exchange parse error: {e}")))?;

        Ok(TokenResponse {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token,
            expires_in: parsed.expires_in,
            scopes: parsed.scope.unwrap_or_default(),
        })
    }

    async fn validate(&self, access_token: &str) -> Result<ValidatedIdentity, Error> {
        let resp = self
            .http
            .get(format!("{}/oauth2/validate", self.auth_base))
            .header("Authorization", format!("OAuth {access_token}"))
            .send()
            .await
            .map_err(|e| Error::Auth(format!("error calling /validate: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::Auth(format!(
                "failed to validate token: HTTP {}",
                resp.status()
            )));
        }

        let validate: TwitchValidateResponse = resp
            .json()
            .await
            .map_err(|e| Error::Auth(format!("error parsing /validate response: {e}")))?;

        debug!(
            "/validate returned login={} user_id={}",
            validate.login, validate.user_id
        );
        Ok(ValidatedIdentity {
            login: validate.login,
            user_id: validate.user_id,
        })
    }

    fn build_authorize_url(&self, state: &str) -> String {
        let scope_str = REQUESTED_SCOPES.join(" ");
        format!(
            "{}/oauth2/authorize?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            self.auth_base,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scope_str),
            urlencoding::encode(state),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TwitchOauthClient {
        TwitchOauthClient::new(
            "abc123".to_string(),
            "s3cret".to_string(),
            "http://localhost:9876/callback".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn authorize_url_encodes_redirect_and_state() {
        let url = client().build_authorize_url("xyz state");
        assert!(url.starts_with("https://id.twitch.tv/oauth2/authorize?response_type=code"));
        assert!(url.contains("client_id=abc123"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A9876%2Fcallback"));
        assert!(url.contains("state=xyz%20state"));
    }

    #[test]
    fn authorize_url_requests_vip_scope() {
        let url = client().build_authorize_url("s");
        assert!(url.contains("channel%3Amanage%3Avips"));
    }

    #[test]
    fn auth_base_override_rewrites_endpoints() {
        let c = client().with_auth_base("http://127.0.0.1:18080");
        assert!(c
            .build_authorize_url("s")
            .starts_with("http://127.0.0.1:18080/oauth2/authorize"));
        assert_eq!(c.token_url(), "http://127.0.0.1:18080/oauth2/token");
    }
}
