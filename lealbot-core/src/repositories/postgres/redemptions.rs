// src/repositories/postgres/redemptions.rs

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Transaction};
use uuid::Uuid;

use lealbot_common::models::redemption::{Redemption, RedemptionStatus};
use lealbot_common::traits::repository_traits::RedemptionRepository;
use crate::Error;

#[derive(Clone)]
pub struct PostgresRedemptionRepository {
    pool: Pool<Postgres>,
}

const REDEMPTION_COLUMNS: &str =
    "redemption_id, user_id, offer_id, price, status, note, created_at, updated_at";

impl PostgresRedemptionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn insert_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        redemption: &Redemption,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO redemptions (
                redemption_id, user_id, offer_id, price, status, note, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(redemption.redemption_id)
        .bind(redemption.user_id)
        .bind(redemption.offer_id)
        .bind(redemption.price)
        .bind(redemption.status.to_string())
        .bind(&redemption.note)
        .bind(redemption.created_at)
        .bind(redemption.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Locks the redemption row. Refund and cancel decisions are made
    /// against the state this returns.
    pub async fn lock_redemption(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        redemption_id: Uuid,
    ) -> Result<Option<Redemption>, Error> {
        let redemption = sqlx::query_as::<_, Redemption>(&format!(
            "SELECT {REDEMPTION_COLUMNS} FROM redemptions WHERE redemption_id = $1 FOR UPDATE"
        ))
        .bind(redemption_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(redemption)
    }

    pub async fn update_status_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        redemption_id: Uuid,
        status: RedemptionStatus,
        note: Option<&str>,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE redemptions
            SET status = $1,
                note = COALESCE($2, note),
                updated_at = $3
            WHERE redemption_id = $4
            "#,
        )
        .bind(status.to_string())
        .bind(note)
        .bind(Utc::now())
        .bind(redemption_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RedemptionRepository for PostgresRedemptionRepository {
    async fn get_redemption(&self, redemption_id: Uuid) -> Result<Option<Redemption>, Error> {
        let redemption = sqlx::query_as::<_, Redemption>(&format!(
            "SELECT {REDEMPTION_COLUMNS} FROM redemptions WHERE redemption_id = $1"
        ))
        .bind(redemption_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(redemption)
    }

    async fn list_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Redemption>, Error> {
        let redemptions = sqlx::query_as::<_, Redemption>(&format!(
            r#"
            SELECT {REDEMPTION_COLUMNS}
            FROM redemptions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(redemptions)
    }

    async fn list_by_status(
        &self,
        status: RedemptionStatus,
        limit: i64,
    ) -> Result<Vec<Redemption>, Error> {
        let redemptions = sqlx::query_as::<_, Redemption>(&format!(
            r#"
            SELECT {REDEMPTION_COLUMNS}
            FROM redemptions
            WHERE status = $1
            ORDER BY created_at ASC
            LIMIT $2
            "#
        ))
        .bind(status.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(redemptions)
    }
}
