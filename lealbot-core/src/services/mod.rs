// File: lealbot-core/src/services/mod.rs

pub mod event_service;
pub mod points_ledger;

pub use event_service::{ChannelEvent, EventService, PointsConfig};
pub use points_ledger::PointsLedger;
