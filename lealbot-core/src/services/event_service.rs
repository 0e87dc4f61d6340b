// File: lealbot-core/src/services/event_service.rs
//
// Function-level entry point for inbound platform events. The webhook
// transport (out of scope here) parses deliveries into `ChannelEvent`s and
// calls `handle_event` once per delivery; everything after that point is
// safe under redelivery.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use lealbot_common::traits::repository_traits::UserRepository;

use crate::services::PointsLedger;
use crate::Error;

/// One inbound channel event, already parsed out of the webhook payload.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Chat {
        message_id: String,
        platform_user_id: String,
        username: String,
        text: String,
    },
    Follow {
        event_id: String,
        platform_user_id: String,
        username: String,
    },
    Subscription {
        event_id: String,
        platform_user_id: String,
        username: String,
        months: i32,
    },
    GiftSub {
        event_id: String,
        platform_user_id: String,
        username: String,
        count: i32,
    },
}

impl ChannelEvent {
    /// The platform's unique delivery id. Chat messages are keyed by their
    /// message id, everything else by the event id; both are unique per
    /// delivery on the platform side and double as the idempotency key.
    pub fn event_key(&self) -> &str {
        match self {
            ChannelEvent::Chat { message_id, .. } => message_id,
            ChannelEvent::Follow { event_id, .. } => event_id,
            ChannelEvent::Subscription { event_id, .. } => event_id,
            ChannelEvent::GiftSub { event_id, .. } => event_id,
        }
    }

    pub fn platform_user_id(&self) -> &str {
        match self {
            ChannelEvent::Chat { platform_user_id, .. } => platform_user_id,
            ChannelEvent::Follow { platform_user_id, .. } => platform_user_id,
            ChannelEvent::Subscription { platform_user_id, .. } => platform_user_id,
            ChannelEvent::GiftSub { platform_user_id, .. } => platform_user_id,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            ChannelEvent::Chat { username, .. } => username,
            ChannelEvent::Follow { username, .. } => username,
            ChannelEvent::Subscription { username, .. } => username,
            ChannelEvent::GiftSub { username, .. } => username,
        }
    }
}

/// How many points each event kind is worth. A zero disables the grant for
/// that kind entirely (no zero-delta entry per chat line).
#[derive(Debug, Clone)]
pub struct PointsConfig {
    pub per_chat_message: i64,
    pub per_follow: i64,
    pub per_sub: i64,
    pub per_gift_sub: i64,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            per_chat_message: 1,
            per_follow: 100,
            per_sub: 500,
            per_gift_sub: 200,
        }
    }
}

pub struct EventService {
    user_repo: Arc<dyn UserRepository>,
    ledger: PointsLedger,
    config: PointsConfig,
}

impl EventService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        ledger: PointsLedger,
        config: PointsConfig,
    ) -> Self {
        Self {
            user_repo,
            ledger,
            config,
        }
    }

    /// Handles one delivery. Gets or creates the user (refreshing username
    /// and last-seen), computes the grant and applies it keyed by the event
    /// id. Redelivered events reach `grant_for_event`, find their key
    /// claimed and grant nothing.
    pub async fn handle_event(&self, event: &ChannelEvent) -> Result<(), Error> {
        let user = self
            .user_repo
            .get_or_create(event.platform_user_id(), event.username())
            .await?;

        let (delta, reason, context) = match event {
            ChannelEvent::Chat { message_id, .. } => (
                self.config.per_chat_message,
                "chat activity",
                json!({ "kind": "chat", "message_id": message_id }),
            ),
            ChannelEvent::Follow { event_id, .. } => (
                self.config.per_follow,
                "new follower",
                json!({ "kind": "follow", "event_id": event_id }),
            ),
            ChannelEvent::Subscription {
                event_id, months, ..
            } => (
                self.config.per_sub,
                "subscription",
                json!({ "kind": "subscription", "event_id": event_id, "months": months }),
            ),
            ChannelEvent::GiftSub {
                event_id, count, ..
            } => (
                self.config.per_gift_sub * i64::from(*count),
                "gifted subscriptions",
                json!({ "kind": "gift_sub", "event_id": event_id, "count": count }),
            ),
        };

        if delta == 0 {
            debug!(
                "Grants disabled for this event kind; ignoring '{}'",
                event.event_key()
            );
            return Ok(());
        }

        match self
            .ledger
            .grant_for_event(user.user_id, delta, reason, Some(context), event.event_key())
            .await?
        {
            Some(entry) => debug!(
                "Granted {} points to '{}' ({})",
                entry.delta, user.username, reason
            ),
            None => debug!(
                "Duplicate delivery of event '{}' ignored",
                event.event_key()
            ),
        }
        Ok(())
    }
}
