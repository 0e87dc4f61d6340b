// =============================================================================
// lealbot-core/src/auth/mod.rs
// =============================================================================

use async_trait::async_trait;
use crate::Error;

pub mod callback_server;
pub mod token_file;
pub mod token_manager;

pub use token_file::{TokenFileStore, TokenRecord};
pub use token_manager::TokenManager;

/// Token endpoint response, shared by the code-exchange and refresh flows.
#[derive(Debug, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    /// Rotation is optional on the server side; `None` means keep using the
    /// previous refresh token.
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    pub scopes: Vec<String>,
}

/// Identity attached to an access token, per the platform's validate endpoint.
#[derive(Debug, Clone)]
pub struct ValidatedIdentity {
    pub login: String,
    pub user_id: String,
}

/// The OAuth surface of the platform as the token lifecycle sees it. The live
/// implementation is `platforms::twitch::TwitchOauthClient`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OauthClient: Send + Sync {
    /// POSTs a `grant_type=refresh_token` exchange. A terminal rejection
    /// (revoked or consumed refresh token) surfaces as
    /// `Error::RefreshTokenExpired`; anything else is transient.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, Error>;

    /// Exchanges an authorization code from the consent flow.
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, Error>;

    /// Asks the platform who the token belongs to.
    async fn validate(&self, access_token: &str) -> Result<ValidatedIdentity, Error>;

    fn build_authorize_url(&self, state: &str) -> String;
}
