// src/repositories/postgres/ledger.rs

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use lealbot_common::models::ledger::LedgerEntry;
use lealbot_common::traits::repository_traits::LedgerRepository;
use crate::Error;

/// Append-only ledger plus the webhook idempotency keys. Entries are written
/// only through `insert_entry_tx` so every one of them shares a transaction
/// with the balance write it explains.
#[derive(Clone)]
pub struct PostgresLedgerRepository {
    pool: Pool<Postgres>,
}

impl PostgresLedgerRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn insert_entry_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entry: &LedgerEntry,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                entry_id, user_id, delta, category, reason, context, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.entry_id)
        .bind(entry.user_id)
        .bind(entry.delta)
        .bind(entry.category.to_string())
        .bind(&entry.reason)
        .bind(&entry.context)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Claims a webhook event id inside the caller's transaction. Returns
    /// false when the key was already present, i.e. a duplicate delivery.
    /// The claim commits or rolls back together with the grant it guards.
    pub async fn claim_event_key_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_id: &str,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, processed_at)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl LedgerRepository for PostgresLedgerRepository {
    async fn list_entries_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<LedgerEntry>, Error> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT entry_id, user_id, delta, category, reason, context, created_at
            FROM ledger_entries
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn sum_deltas(&self, user_id: Uuid) -> Result<i64, Error> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(delta), 0)::BIGINT AS total FROM ledger_entries WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("total")?)
    }
}
