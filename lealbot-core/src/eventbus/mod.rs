//! src/eventbus/mod.rs
//!
//! In-process event bus with guaranteed delivery to multiple subscribers via
//! bounded MPSC queues. Carries the post-commit notifications that decouple
//! ledger transactions from their side effects.

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

/// Events the shop publishes or subscribes to.
#[derive(Debug, Clone)]
pub enum ShopEvent {
    /// Periodic heartbeat from the server loop.
    Tick,

    /// System-wide event for debugging or administration.
    SystemMessage(String),

    /// A redemption moved to `Delivered`. Published after the transaction
    /// commits, so subscribers always observe durable state. Delivery to
    /// subscribers is at-least-once from the caller's point of view; anything
    /// acting on it must tolerate replays.
    RedemptionDelivered {
        redemption_id: Uuid,
        user_id: Uuid,
        platform_user_id: String,
        username: String,
        offer_name: String,
    },
}

impl ShopEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ShopEvent::Tick => "tick",
            ShopEvent::SystemMessage(_) => "system_message",
            ShopEvent::RedemptionDelivered { .. } => "redemption_delivered",
        }
    }
}

/// Each subscriber gets its own `mpsc::Sender<ShopEvent>`.
///
/// - If a subscriber's buffer fills, `publish` awaits until there is space
///   (backpressure).
/// - If a subscriber dropped its `Receiver`, the send error is ignored and
///   the remaining subscribers still receive the event.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<ShopEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

const DEFAULT_BUFFER_SIZE: usize = 10000;

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Returns a receiver on which events will be delivered.
    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<ShopEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        let mut subs = self.subscribers.lock().await;
        subs.push(tx);
        rx
    }

    /// Publish an event to all subscribers.
    pub async fn publish(&self, event: ShopEvent) {
        let senders = {
            let subs = self.subscribers.lock().await;
            subs.clone()
        };
        for s in senders {
            let _ = s.send(event.clone()).await;
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
