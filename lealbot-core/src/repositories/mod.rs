// src/repositories/mod.rs

pub mod postgres;

pub use postgres::credentials::PostgresCredentialsRepository;
pub use postgres::ledger::PostgresLedgerRepository;
pub use postgres::offers::PostgresOfferRepository;
pub use postgres::redemptions::PostgresRedemptionRepository;
pub use postgres::users::PostgresUserRepository;
