// File: lealbot-common/src/models/ledger.rs

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
#[sqlx(rename_all = "lowercase")]
pub enum LedgerCategory {
    /// Points granted: event rewards, refunds.
    Earned,
    /// Points spent on a redemption. Always a negative delta.
    Spent,
    /// Operator correction; delta may be positive, negative, or zero.
    Adjustment,
}

impl fmt::Display for LedgerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerCategory::Earned => write!(f, "earned"),
            LedgerCategory::Spent => write!(f, "spent"),
            LedgerCategory::Adjustment => write!(f, "adjustment"),
        }
    }
}

impl FromStr for LedgerCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "earned" => Ok(LedgerCategory::Earned),
            "spent" => Ok(LedgerCategory::Spent),
            "adjustment" => Ok(LedgerCategory::Adjustment),
            _ => Err(format!("Invalid ledger category: {}", s)),
        }
    }
}

/// Append-only audit record. A user's cached balance always equals the sum
/// of their entry deltas; entries are never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    pub user_id: Uuid,
    pub delta: i64,
    pub category: LedgerCategory,
    pub reason: String,
    /// Free-form payload tying the entry to its origin (event body,
    /// redemption id, operator name).
    pub context: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        user_id: Uuid,
        delta: i64,
        category: LedgerCategory,
        reason: &str,
        context: Option<Value>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            user_id,
            delta,
            category,
            reason: reason.to_string(),
            context,
            created_at: Utc::now(),
        }
    }
}
