// =============================================================================
// lealbot-core/src/services/points_ledger.rs
// =============================================================================
//
// Every balance mutation in the shop runs through this service, inside one
// transaction that locks the rows it is about to change and re-checks its
// preconditions on the locked state. The cached `users.points` column and the
// ledger always move together; `sum(ledger deltas) == points` holds at every
// commit boundary.
//
// Lock order is redemption, then offer, then user. Keeping the order fixed
// across operations means two of them can never deadlock on each other.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use sqlx::{Pool, Postgres, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use lealbot_common::models::ledger::{LedgerCategory, LedgerEntry};
use lealbot_common::models::redemption::{Redemption, RedemptionStatus};
use lealbot_common::traits::repository_traits::{OfferRepository, UserRepository};

use crate::eventbus::{EventBus, ShopEvent};
use crate::repositories::postgres::{
    PostgresLedgerRepository, PostgresOfferRepository, PostgresRedemptionRepository,
    PostgresUserRepository,
};
use crate::Error;

#[derive(Clone)]
pub struct PointsLedger {
    pool: Pool<Postgres>,
    users: PostgresUserRepository,
    offers: PostgresOfferRepository,
    redemptions: PostgresRedemptionRepository,
    ledger: PostgresLedgerRepository,
    event_bus: Arc<EventBus>,
}

impl PointsLedger {
    pub fn new(pool: Pool<Postgres>, event_bus: Arc<EventBus>) -> Self {
        Self {
            users: PostgresUserRepository::new(pool.clone()),
            offers: PostgresOfferRepository::new(pool.clone()),
            redemptions: PostgresRedemptionRepository::new(pool.clone()),
            ledger: PostgresLedgerRepository::new(pool.clone()),
            pool,
            event_bus,
        }
    }

    /// Spends points on an offer and opens a `Pending` redemption.
    ///
    /// Stock and balance are re-checked on the locked rows, so two racing
    /// redemptions against the last unit (or against the same balance) agree
    /// on exactly one winner. The stock decrement, balance decrement, ledger
    /// entry and redemption row commit together or not at all.
    pub async fn redeem(&self, user_id: Uuid, offer_id: Uuid) -> Result<Redemption, Error> {
        let mut tx = self.pool.begin().await?;

        let offer = self
            .offers
            .lock_offer(&mut tx, offer_id)
            .await?
            .ok_or(Error::OfferUnavailable)?;
        if !offer.is_listed {
            return Err(Error::OfferUnavailable);
        }
        if offer.stock <= 0 {
            return Err(Error::OutOfStock);
        }

        let user = self
            .users
            .lock_user(&mut tx, user_id)
            .await?
            .ok_or(Error::UserNotFound)?;
        if user.points < offer.price {
            return Err(Error::InsufficientBalance {
                needed: offer.price,
                available: user.points,
            });
        }

        self.offers
            .update_stock_tx(&mut tx, offer_id, offer.stock - 1)
            .await?;
        self.users
            .update_points_tx(&mut tx, user_id, user.points - offer.price)
            .await?;

        let entry = LedgerEntry::new(
            user_id,
            -offer.price,
            LedgerCategory::Spent,
            &format!("redeemed offer '{}'", offer.name),
            Some(json!({ "offer_id": offer.offer_id, "offer_name": offer.name })),
        );
        self.ledger.insert_entry_tx(&mut tx, &entry).await?;

        let now = Utc::now();
        let redemption = Redemption {
            redemption_id: Uuid::new_v4(),
            user_id,
            offer_id,
            price: offer.price,
            status: RedemptionStatus::Pending,
            note: None,
            created_at: now,
            updated_at: now,
        };
        self.redemptions.insert_tx(&mut tx, &redemption).await?;

        tx.commit().await?;

        info!(
            "User '{}' redeemed '{}' for {} points ({} left in stock)",
            user.username,
            offer.name,
            offer.price,
            offer.stock - 1
        );
        Ok(redemption)
    }

    /// Reverses a redemption: points back to the user, one unit back in
    /// stock, an `earned` ledger entry naming the operator. Allowed from
    /// `Pending` and `Delivered`. A `Cancelled` redemption was already
    /// compensated, so refunding it would pay the user twice.
    pub async fn refund(
        &self,
        redemption_id: Uuid,
        operator: &str,
        reason: Option<&str>,
    ) -> Result<Redemption, Error> {
        let mut tx = self.pool.begin().await?;

        let redemption = self
            .redemptions
            .lock_redemption(&mut tx, redemption_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("redemption {redemption_id}")))?;

        match redemption.status {
            RedemptionStatus::Refunded => return Err(Error::AlreadyRefunded),
            RedemptionStatus::Cancelled => {
                return Err(Error::InvalidState(
                    "cancelled redemptions were already compensated".to_string(),
                ));
            }
            RedemptionStatus::Pending | RedemptionStatus::Delivered => {}
        }

        let note = match reason {
            Some(r) => format!("refund by {operator}: {r}"),
            None => format!("refund by {operator}"),
        };
        self.compensate(&mut tx, &redemption, RedemptionStatus::Refunded, &note, operator)
            .await?;

        tx.commit().await?;

        info!(
            "Refunded redemption {} ({} points) by operator '{}'",
            redemption_id, redemption.price, operator
        );
        Ok(Redemption {
            status: RedemptionStatus::Refunded,
            note: Some(note),
            updated_at: Utc::now(),
            ..redemption
        })
    }

    /// Operator rejection of a redemption that was never delivered. Same
    /// compensation as a refund, but the terminal state is `Cancelled` so a
    /// later refund attempt is refused.
    pub async fn cancel(
        &self,
        redemption_id: Uuid,
        operator: &str,
        reason: Option<&str>,
    ) -> Result<Redemption, Error> {
        let mut tx = self.pool.begin().await?;

        let redemption = self
            .redemptions
            .lock_redemption(&mut tx, redemption_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("redemption {redemption_id}")))?;

        match redemption.status {
            RedemptionStatus::Pending => {}
            RedemptionStatus::Refunded => return Err(Error::AlreadyRefunded),
            RedemptionStatus::Delivered => {
                return Err(Error::InvalidState(
                    "delivered redemptions can only be refunded".to_string(),
                ));
            }
            RedemptionStatus::Cancelled => {
                return Err(Error::InvalidState(
                    "redemption is already cancelled".to_string(),
                ));
            }
        }

        let note = match reason {
            Some(r) => format!("cancelled by {operator}: {r}"),
            None => format!("cancelled by {operator}"),
        };
        self.compensate(&mut tx, &redemption, RedemptionStatus::Cancelled, &note, operator)
            .await?;

        tx.commit().await?;

        info!(
            "Cancelled redemption {} ({} points returned) by operator '{}'",
            redemption_id, redemption.price, operator
        );
        Ok(Redemption {
            status: RedemptionStatus::Cancelled,
            note: Some(note),
            updated_at: Utc::now(),
            ..redemption
        })
    }

    /// Shared tail of refund and cancel: flip the status, put the unit back
    /// in stock, credit the price back and write the compensating entry.
    async fn compensate(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        redemption: &Redemption,
        final_status: RedemptionStatus,
        note: &str,
        operator: &str,
    ) -> Result<(), Error> {
        self.redemptions
            .update_status_tx(tx, redemption.redemption_id, final_status, Some(note))
            .await?;

        let offer = self
            .offers
            .lock_offer(tx, redemption.offer_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("offer {}", redemption.offer_id)))?;
        self.offers
            .update_stock_tx(tx, offer.offer_id, offer.stock + 1)
            .await?;

        let user = self
            .users
            .lock_user(tx, redemption.user_id)
            .await?
            .ok_or(Error::UserNotFound)?;
        self.users
            .update_points_tx(tx, user.user_id, user.points + redemption.price)
            .await?;

        let entry = LedgerEntry::new(
            redemption.user_id,
            redemption.price,
            LedgerCategory::Earned,
            note,
            Some(json!({
                "redemption_id": redemption.redemption_id,
                "operator": operator,
            })),
        );
        self.ledger.insert_entry_tx(tx, &entry).await
    }

    /// Applies an arbitrary delta to a balance. Used for admin corrections
    /// and zero-delta bookkeeping entries; the delta may be zero or take the
    /// balance negative, only `redeem` insists on covering funds.
    pub async fn adjust_balance(
        &self,
        user_id: Uuid,
        delta: i64,
        category: LedgerCategory,
        reason: &str,
        context: Option<Value>,
    ) -> Result<LedgerEntry, Error> {
        let mut tx = self.pool.begin().await?;

        let user = self
            .users
            .lock_user(&mut tx, user_id)
            .await?
            .ok_or(Error::UserNotFound)?;
        let new_balance = user.points.checked_add(delta).ok_or_else(|| {
            Error::InvalidState(format!("point balance would overflow for '{}'", user.username))
        })?;
        self.users
            .update_points_tx(&mut tx, user_id, new_balance)
            .await?;

        let entry = LedgerEntry::new(user_id, delta, category, reason, context);
        self.ledger.insert_entry_tx(&mut tx, &entry).await?;

        tx.commit().await?;

        debug!(
            "Adjusted balance for '{}' by {} ({})",
            user.username, delta, reason
        );
        Ok(entry)
    }

    /// Grant driven by an external event delivery. The event key is claimed
    /// in the same transaction as the balance change, so a redelivered
    /// webhook either finds the key already present and grants nothing, or
    /// the whole grant rolls back and the key with it. `Ok(None)` is the
    /// duplicate case.
    pub async fn grant_for_event(
        &self,
        user_id: Uuid,
        delta: i64,
        reason: &str,
        context: Option<Value>,
        event_key: &str,
    ) -> Result<Option<LedgerEntry>, Error> {
        let mut tx = self.pool.begin().await?;

        if !self.ledger.claim_event_key_tx(&mut tx, event_key).await? {
            debug!("Event '{}' was already processed; skipping grant", event_key);
            return Ok(None);
        }

        let user = self
            .users
            .lock_user(&mut tx, user_id)
            .await?
            .ok_or(Error::UserNotFound)?;
        let new_balance = user.points.checked_add(delta).ok_or_else(|| {
            Error::InvalidState(format!("point balance would overflow for '{}'", user.username))
        })?;
        self.users
            .update_points_tx(&mut tx, user_id, new_balance)
            .await?;

        let entry = LedgerEntry::new(user_id, delta, LedgerCategory::Earned, reason, context);
        self.ledger.insert_entry_tx(&mut tx, &entry).await?;

        tx.commit().await?;

        debug!(
            "Granted {} points to '{}' for event '{}'",
            delta, user.username, event_key
        );
        Ok(Some(entry))
    }

    /// `Pending -> Delivered`. Publishes `RedemptionDelivered` on the event
    /// bus after the commit; subscribers (chat announcement, vip grant) react
    /// outside the transaction so their failures can never unwind it.
    pub async fn mark_delivered(&self, redemption_id: Uuid) -> Result<Redemption, Error> {
        let mut tx = self.pool.begin().await?;

        let redemption = self
            .redemptions
            .lock_redemption(&mut tx, redemption_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("redemption {redemption_id}")))?;

        if redemption.status != RedemptionStatus::Pending {
            return Err(Error::InvalidState(format!(
                "cannot deliver a redemption in state '{}'",
                redemption.status
            )));
        }

        self.redemptions
            .update_status_tx(&mut tx, redemption_id, RedemptionStatus::Delivered, None)
            .await?;

        tx.commit().await?;

        let updated = Redemption {
            status: RedemptionStatus::Delivered,
            updated_at: Utc::now(),
            ..redemption
        };

        match self.delivery_event(&updated).await {
            Ok(event) => self.event_bus.publish(event).await,
            Err(e) => warn!(
                "Delivered redemption {} but could not build its event: {:?}",
                redemption_id, e
            ),
        }

        info!("Redemption {} marked delivered", redemption_id);
        Ok(updated)
    }

    async fn delivery_event(&self, redemption: &Redemption) -> Result<ShopEvent, Error> {
        let user = self
            .users
            .get(redemption.user_id)
            .await?
            .ok_or(Error::UserNotFound)?;
        let offer = self
            .offers
            .get_offer(redemption.offer_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("offer {}", redemption.offer_id)))?;

        Ok(ShopEvent::RedemptionDelivered {
            redemption_id: redemption.redemption_id,
            user_id: user.user_id,
            platform_user_id: user.platform_user_id,
            username: user.username,
            offer_name: offer.name,
        })
    }

    /// Called by the vip subscriber once the platform grant went through.
    /// Flips the flag and writes a zero-delta adjustment so the ledger
    /// records the perk without touching the balance.
    pub async fn record_vip_grant(&self, user_id: Uuid, redemption_id: Uuid) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        let user = self
            .users
            .lock_user(&mut tx, user_id)
            .await?
            .ok_or(Error::UserNotFound)?;
        self.users.set_vip_tx(&mut tx, user_id, true).await?;

        let entry = LedgerEntry::new(
            user_id,
            0,
            LedgerCategory::Adjustment,
            "vip status granted",
            Some(json!({ "redemption_id": redemption_id })),
        );
        self.ledger.insert_entry_tx(&mut tx, &entry).await?;

        tx.commit().await?;

        info!(
            "User '{}' is now VIP (redemption {})",
            user.username, redemption_id
        );
        Ok(())
    }
}
