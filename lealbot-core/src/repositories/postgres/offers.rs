// src/repositories/postgres/offers.rs

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Transaction};
use uuid::Uuid;

use lealbot_common::models::offer::Offer;
use lealbot_common::traits::repository_traits::OfferRepository;
use crate::Error;

#[derive(Clone)]
pub struct PostgresOfferRepository {
    pool: Pool<Postgres>,
}

const OFFER_COLUMNS: &str =
    "offer_id, name, description, price, stock, is_listed, created_at, updated_at";

impl PostgresOfferRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Locks the offer row for the rest of the transaction. The caller
    /// re-checks `is_listed` and `stock` on the row this returns, not on
    /// whatever it read before the lock.
    pub async fn lock_offer(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        offer_id: Uuid,
    ) -> Result<Option<Offer>, Error> {
        let offer = sqlx::query_as::<_, Offer>(&format!(
            "SELECT {OFFER_COLUMNS} FROM offers WHERE offer_id = $1 FOR UPDATE"
        ))
        .bind(offer_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(offer)
    }

    pub async fn update_stock_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        offer_id: Uuid,
        stock: i32,
    ) -> Result<(), Error> {
        sqlx::query("UPDATE offers SET stock = $1, updated_at = $2 WHERE offer_id = $3")
            .bind(stock)
            .bind(Utc::now())
            .bind(offer_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OfferRepository for PostgresOfferRepository {
    async fn create_offer(&self, offer: &Offer) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO offers (
                offer_id, name, description, price, stock, is_listed, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(offer.offer_id)
        .bind(&offer.name)
        .bind(&offer.description)
        .bind(offer.price)
        .bind(offer.stock)
        .bind(offer.is_listed)
        .bind(offer.created_at)
        .bind(offer.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_offer(&self, offer_id: Uuid) -> Result<Option<Offer>, Error> {
        let offer = sqlx::query_as::<_, Offer>(&format!(
            "SELECT {OFFER_COLUMNS} FROM offers WHERE offer_id = $1"
        ))
        .bind(offer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(offer)
    }

    async fn get_offer_by_name(&self, name: &str) -> Result<Option<Offer>, Error> {
        let offer = sqlx::query_as::<_, Offer>(&format!(
            "SELECT {OFFER_COLUMNS} FROM offers WHERE LOWER(name) = LOWER($1)"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(offer)
    }

    async fn list_offers(&self, listed_only: bool) -> Result<Vec<Offer>, Error> {
        let sql = if listed_only {
            format!("SELECT {OFFER_COLUMNS} FROM offers WHERE is_listed = TRUE ORDER BY price ASC")
        } else {
            format!("SELECT {OFFER_COLUMNS} FROM offers ORDER BY price ASC")
        };
        let offers = sqlx::query_as::<_, Offer>(&sql).fetch_all(&self.pool).await?;
        Ok(offers)
    }

    async fn update_offer(&self, offer: &Offer) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE offers
            SET name = $1,
                description = $2,
                price = $3,
                stock = $4,
                is_listed = $5,
                updated_at = $6
            WHERE offer_id = $7
            "#,
        )
        .bind(&offer.name)
        .bind(&offer.description)
        .bind(offer.price)
        .bind(offer.stock)
        .bind(offer.is_listed)
        .bind(Utc::now())
        .bind(offer.offer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_listed(&self, offer_id: Uuid, is_listed: bool) -> Result<(), Error> {
        sqlx::query("UPDATE offers SET is_listed = $1, updated_at = $2 WHERE offer_id = $3")
            .bind(is_listed)
            .bind(Utc::now())
            .bind(offer_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
