// File: lealbot-common/src/models/offer.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A redeemable item in the shop. Stock only changes inside the same
/// transaction as the ledger mutation that pays for (or refunds) it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Offer {
    pub offer_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub stock: i32,
    /// Unlisted offers are hidden from redemption; existing redemptions
    /// against them can still be refunded.
    pub is_listed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Offer {
    pub fn new(name: &str, description: Option<&str>, price: i64, stock: i32) -> Self {
        let now = Utc::now();
        Self {
            offer_id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(String::from),
            price,
            stock,
            is_listed: true,
            created_at: now,
            updated_at: now,
        }
    }
}
