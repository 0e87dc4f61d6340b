// File: lealbot-core/src/tasks/token_refresh.rs

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::auth::TokenManager;
use crate::eventbus::EventBus;

/// How often the renewal sweep runs unless the caller picks something else.
pub const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(10 * 60);

/// Spawns the periodic renewal sweep. The first tick fires immediately, so
/// credentials that went stale while the process was down are refreshed at
/// startup. Sweep failures are logged and the loop keeps going; the task
/// exits when the event bus signals shutdown.
pub fn spawn_token_refresh_task(
    manager: TokenManager,
    event_bus: Arc<EventBus>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        let mut shutdown_rx = event_bus.shutdown_rx.clone();
        info!("Token refresh task started (period {:?})", period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match manager.sweep_once().await {
                        Ok(0) => {}
                        Ok(n) => info!("Token sweep refreshed {} credential(s)", n),
                        Err(e) => error!("Token sweep failed: {:?}", e),
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Token refresh task shutting down");
                        break;
                    }
                }
            }
        }
    })
}
