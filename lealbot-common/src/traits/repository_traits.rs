use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;
use crate::error::Error;
use crate::models::credential::BotCredential;
use crate::models::ledger::LedgerEntry;
use crate::models::offer::Offer;
use crate::models::redemption::{Redemption, RedemptionStatus};
use crate::models::user::User;

#[async_trait]
pub trait CredentialsRepository: Send + Sync {
    /// Inserts the credential, or overwrites the existing row for the same
    /// platform account.
    async fn store_credentials(&self, creds: &BotCredential) -> Result<(), Error>;

    async fn get_credential_by_id(&self, credential_id: Uuid) -> Result<Option<BotCredential>, Error>;

    /// Looks a credential up by the bot account's login name, active or not.
    async fn get_credential_by_user_name(&self, user_name: &str) -> Result<Option<BotCredential>, Error>;

    async fn update_credentials(&self, creds: &BotCredential) -> Result<(), Error>;

    /// Active credentials, most recently updated first. This is the
    /// resolution order for picking a usable bot token.
    async fn list_active_credentials(&self) -> Result<Vec<BotCredential>, Error>;

    /// Active credentials whose tokens expire within `within` from now.
    async fn get_expiring_credentials(&self, within: Duration) -> Result<Vec<BotCredential>, Error>;

    /// Flips the active flag. Used when a refresh fails terminally and by
    /// operator tooling.
    async fn set_credential_active(&self, credential_id: Uuid, is_active: bool) -> Result<(), Error>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<(), Error>;
    async fn get(&self, user_id: Uuid) -> Result<Option<User>, Error>;
    async fn get_by_platform_user_id(&self, platform_user_id: &str) -> Result<Option<User>, Error>;
    async fn update(&self, user: &User) -> Result<(), Error>;

    /// Fetch by platform id, creating the row on first sight. Refreshes
    /// `username` and `last_seen` either way.
    async fn get_or_create(&self, platform_user_id: &str, username: &str) -> Result<User, Error>;
}

#[async_trait]
pub trait OfferRepository: Send + Sync {
    async fn create_offer(&self, offer: &Offer) -> Result<(), Error>;
    async fn get_offer(&self, offer_id: Uuid) -> Result<Option<Offer>, Error>;
    async fn get_offer_by_name(&self, name: &str) -> Result<Option<Offer>, Error>;
    async fn list_offers(&self, listed_only: bool) -> Result<Vec<Offer>, Error>;
    async fn update_offer(&self, offer: &Offer) -> Result<(), Error>;
    async fn set_listed(&self, offer_id: Uuid, is_listed: bool) -> Result<(), Error>;
}

#[async_trait]
pub trait RedemptionRepository: Send + Sync {
    async fn get_redemption(&self, redemption_id: Uuid) -> Result<Option<Redemption>, Error>;
    async fn list_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Redemption>, Error>;
    async fn list_by_status(&self, status: RedemptionStatus, limit: i64) -> Result<Vec<Redemption>, Error>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn list_entries_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<LedgerEntry>, Error>;

    /// Sum of every delta written for the user. Equals the cached balance
    /// whenever the ledger invariant holds.
    async fn sum_deltas(&self, user_id: Uuid) -> Result<i64, Error>;
}
