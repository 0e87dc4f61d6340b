// File: lealbot-common/src/models/mod.rs
pub mod credential;
pub mod ledger;
pub mod offer;
pub mod redemption;
pub mod user;

pub use credential::BotCredential;
pub use ledger::{LedgerCategory, LedgerEntry};
pub use offer::Offer;
pub use redemption::{Redemption, RedemptionStatus};
pub use user::User;
