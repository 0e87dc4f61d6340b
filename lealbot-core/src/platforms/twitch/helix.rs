// File: lealbot-core/src/platforms/twitch/helix.rs
//
// Helix calls the shop needs: chat announcements and VIP grants. The bearer
// token is resolved through the TokenManager on every call so rotation and
// renewal stay invisible to callers.

use std::time::Duration;

use reqwest::{Client as ReqwestClient, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::TokenManager;
use crate::Error;

const DEFAULT_HELIX_BASE: &str = "https://api.twitch.tv";
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Helix rejects chat messages over 500 characters.
const MAX_CHAT_MESSAGE_CHARS: usize = 500;

#[derive(Serialize)]
struct SendChatMessageBody<'a> {
    broadcaster_id: &'a str,
    sender_id: &'a str,
    message: &'a str,
}

pub struct HelixClient {
    http: ReqwestClient,
    token_manager: TokenManager,
    client_id: String,
    helix_base: String,
}

impl HelixClient {
    pub fn new(token_manager: TokenManager, client_id: String) -> Result<Self, Error> {
        let http = ReqwestClient::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Platform(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            token_manager,
            client_id,
            helix_base: DEFAULT_HELIX_BASE.to_string(),
        })
    }

    /// Point the client at a different API host, for tests and staging.
    pub fn with_helix_base(mut self, base: impl Into<String>) -> Self {
        self.helix_base = base.into();
        self
    }

    async fn bearer(&self) -> Result<String, Error> {
        self.token_manager
            .resolve_access_token()
            .await?
            .ok_or_else(|| Error::Auth("bot credential unavailable".to_string()))
    }

    /// Posts a chat message into the broadcaster's channel as the bot
    /// account. Messages over the Helix limit are truncated to its first
    /// 500 characters. A non-2xx response is logged and swallowed; a lost
    /// announcement must not fail the operation that produced it.
    pub async fn send_chat_message(
        &self,
        broadcaster_id: &str,
        message: &str,
    ) -> Result<(), Error> {
        let cred = self
            .token_manager
            .resolve_credential()
            .await?
            .ok_or_else(|| Error::Auth("bot credential unavailable".to_string()))?;

        let body = SendChatMessageBody {
            broadcaster_id,
            sender_id: &cred.platform_user_id,
            message: truncate_chat_message(message),
        };
        let url = format!("{}/helix/chat/messages", self.helix_base);

        let resp = self
            .http
            .post(&url)
            .header("Client-Id", &self.client_id)
            .header("Authorization", format!("Bearer {}", cred.access_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Platform(format!("send_chat_message network error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let resp_body = resp.text().await.unwrap_or_default();
            warn!(
                "send_chat_message => status={} body={}",
                status, resp_body
            );
            return Ok(());
        }

        debug!(
            "send_chat_message => sent {} chars to broadcaster {}",
            body.message.chars().count(),
            broadcaster_id
        );
        Ok(())
    }

    /// Adds a channel VIP. Requires scope `channel:manage:vips`. Helix
    /// answers 409 or 422 when the user already holds VIP; both count as
    /// success here since the end state is what was asked for.
    pub async fn grant_vip(&self, broadcaster_id: &str, user_id: &str) -> Result<(), Error> {
        let bearer = self.bearer().await?;
        let url = format!(
            "{}/helix/channels/vips?broadcaster_id={}&user_id={}",
            self.helix_base, broadcaster_id, user_id
        );

        debug!("grant_vip => URL='{}'", url);

        let resp = self
            .http
            .post(&url)
            .header("Client-Id", &self.client_id)
            .header("Authorization", format!("Bearer {bearer}"))
            .send()
            .await
            .map_err(|e| Error::Platform(format!("grant_vip network error: {e}")))?;

        let status = resp.status();
        if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
            debug!(
                "grant_vip => user {} already VIP in channel {}",
                user_id, broadcaster_id
            );
            return Ok(());
        }
        if !status.is_success() {
            let resp_body = resp.text().await.unwrap_or_default();
            warn!("grant_vip => status={} body={}", status, resp_body);
            return Err(Error::Platform(format!(
                "grant_vip: HTTP {status} => {resp_body}"
            )));
        }

        debug!(
            "grant_vip => granted VIP to user {} in channel {}",
            user_id, broadcaster_id
        );
        Ok(())
    }
}

fn truncate_chat_message(text: &str) -> &str {
    // The limit counts characters, not bytes.
    match text.char_indices().nth(MAX_CHAT_MESSAGE_CHARS) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}
