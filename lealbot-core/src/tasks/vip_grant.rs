// File: lealbot-core/src/tasks/vip_grant.rs
//
// Subscriber that turns deliveries of vip offers into platform VIP grants.
// Runs entirely outside the delivery transaction: a failed grant leaves the
// redemption delivered and is only logged.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::eventbus::{EventBus, ShopEvent};
use crate::platforms::twitch::HelixClient;
use crate::services::PointsLedger;

/// Offers whose name contains this (case-insensitive) get the VIP side
/// effect on delivery.
const VIP_KEYWORD: &str = "vip";

const GRANT_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

pub fn spawn_vip_grant_task(
    event_bus: Arc<EventBus>,
    helix: Arc<HelixClient>,
    ledger: PointsLedger,
    broadcaster_id: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = event_bus.subscribe(None).await;
        let mut shutdown_rx = event_bus.shutdown_rx.clone();
        info!("VIP grant task started for channel {}", broadcaster_id);

        loop {
            tokio::select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(ShopEvent::RedemptionDelivered {
                            redemption_id,
                            user_id,
                            platform_user_id,
                            username,
                            offer_name,
                        }) => {
                            if !offer_name.to_lowercase().contains(VIP_KEYWORD) {
                                continue;
                            }
                            debug!(
                                "Delivery of '{}' to '{}' carries the vip perk",
                                offer_name, username
                            );

                            if !grant_with_retries(&helix, &broadcaster_id, &platform_user_id).await {
                                error!(
                                    "Giving up on VIP grant for '{}' (redemption {})",
                                    username, redemption_id
                                );
                                continue;
                            }

                            if let Err(e) = ledger.record_vip_grant(user_id, redemption_id).await {
                                error!(
                                    "VIP granted on the platform but recording it failed: {:?}",
                                    e
                                );
                            }

                            let announcement =
                                format!("{username} is now a channel VIP! Enjoy {offer_name}.");
                            if let Err(e) = helix
                                .send_chat_message(&broadcaster_id, &announcement)
                                .await
                            {
                                warn!("Could not announce the VIP grant in chat: {:?}", e);
                            }
                        }
                        Some(_) => {}
                        None => {
                            debug!("Event bus closed; VIP grant task exiting");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("VIP grant task shutting down");
                        break;
                    }
                }
            }
        }
    })
}

async fn grant_with_retries(
    helix: &HelixClient,
    broadcaster_id: &str,
    platform_user_id: &str,
) -> bool {
    for attempt in 1..=GRANT_ATTEMPTS {
        match helix.grant_vip(broadcaster_id, platform_user_id).await {
            Ok(()) => return true,
            Err(e) => {
                warn!(
                    "VIP grant attempt {}/{} failed: {:?}",
                    attempt, GRANT_ATTEMPTS, e
                );
                if attempt < GRANT_ATTEMPTS {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
    false
}
