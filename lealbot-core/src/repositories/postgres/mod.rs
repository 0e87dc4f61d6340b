// src/repositories/postgres/mod.rs
//
// Pool-level reads and writes implement the traits from lealbot-common.
// Row-locking variants used inside ledger transactions are inherent methods
// taking a `&mut Transaction`, so the caller controls commit scope.

pub mod credentials;
pub mod ledger;
pub mod offers;
pub mod redemptions;
pub mod users;

pub use credentials::PostgresCredentialsRepository;
pub use ledger::PostgresLedgerRepository;
pub use offers::PostgresOfferRepository;
pub use redemptions::PostgresRedemptionRepository;
pub use users::PostgresUserRepository;
