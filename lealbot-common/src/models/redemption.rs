// File: lealbot-common/src/models/redemption.rs

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a redemption:
/// `Pending -> Delivered | Cancelled | Refunded`, `Delivered -> Refunded`.
/// `Cancelled` and `Refunded` are terminal; both mean the user already got
/// their points back.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
#[sqlx(rename_all = "lowercase")]
pub enum RedemptionStatus {
    Pending,
    Delivered,
    Cancelled,
    Refunded,
}

impl RedemptionStatus {
    pub fn can_transition_to(&self, next: RedemptionStatus) -> bool {
        use RedemptionStatus::*;
        matches!(
            (self, next),
            (Pending, Delivered) | (Pending, Cancelled) | (Pending, Refunded) | (Delivered, Refunded)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RedemptionStatus::Cancelled | RedemptionStatus::Refunded)
    }
}

impl fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedemptionStatus::Pending => write!(f, "pending"),
            RedemptionStatus::Delivered => write!(f, "delivered"),
            RedemptionStatus::Cancelled => write!(f, "cancelled"),
            RedemptionStatus::Refunded => write!(f, "refunded"),
        }
    }
}

impl FromStr for RedemptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RedemptionStatus::Pending),
            "delivered" => Ok(RedemptionStatus::Delivered),
            "cancelled" => Ok(RedemptionStatus::Cancelled),
            "refunded" => Ok(RedemptionStatus::Refunded),
            _ => Err(format!("Invalid redemption status: {}", s)),
        }
    }
}

/// One purchase from the shop. `price` is the price paid at redeem time, so
/// later offer repricing never changes what a refund restores.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Redemption {
    pub redemption_id: Uuid,
    pub user_id: Uuid,
    pub offer_id: Uuid,
    pub price: i64,
    pub status: RedemptionStatus,
    /// Operator note attached on refund or cancel.
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_reach_every_outcome() {
        let s = RedemptionStatus::Pending;
        assert!(s.can_transition_to(RedemptionStatus::Delivered));
        assert!(s.can_transition_to(RedemptionStatus::Cancelled));
        assert!(s.can_transition_to(RedemptionStatus::Refunded));
    }

    #[test]
    fn delivered_only_refundable() {
        let s = RedemptionStatus::Delivered;
        assert!(s.can_transition_to(RedemptionStatus::Refunded));
        assert!(!s.can_transition_to(RedemptionStatus::Cancelled));
        assert!(!s.can_transition_to(RedemptionStatus::Pending));
    }

    #[test]
    fn terminal_states_stay_terminal() {
        for s in [RedemptionStatus::Cancelled, RedemptionStatus::Refunded] {
            assert!(s.is_terminal());
            for next in [
                RedemptionStatus::Pending,
                RedemptionStatus::Delivered,
                RedemptionStatus::Cancelled,
                RedemptionStatus::Refunded,
            ] {
                assert!(!s.can_transition_to(next));
            }
        }
    }

    #[test]
    fn status_round_trips_through_text() {
        for s in [
            RedemptionStatus::Pending,
            RedemptionStatus::Delivered,
            RedemptionStatus::Cancelled,
            RedemptionStatus::Refunded,
        ] {
            let parsed: RedemptionStatus = s.to_string().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }
}
