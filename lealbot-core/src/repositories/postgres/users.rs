// src/repositories/postgres/users.rs

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Transaction};
use uuid::Uuid;

use lealbot_common::models::user::User;
use lealbot_common::traits::repository_traits::UserRepository;
use crate::Error;

#[derive(Clone)]
pub struct PostgresUserRepository {
    pool: Pool<Postgres>,
}

impl PostgresUserRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// `SELECT ... FOR UPDATE` on the user row. Holding this lock serializes
    /// every balance mutation for the user until the transaction ends.
    pub async fn lock_user(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
    ) -> Result<Option<User>, Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, platform_user_id, username, points, is_vip, created_at, last_seen
            FROM users
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(user)
    }

    /// Writes the new cached balance. Only called with the row lock held and
    /// always in the same transaction as the matching ledger entry.
    pub async fn update_points_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        points: i64,
    ) -> Result<(), Error> {
        sqlx::query("UPDATE users SET points = $1 WHERE user_id = $2")
            .bind(points)
            .bind(user_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn set_vip_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        is_vip: bool,
    ) -> Result<(), Error> {
        sqlx::query("UPDATE users SET is_vip = $1 WHERE user_id = $2")
            .bind(is_vip)
            .bind(user_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create(&self, user: &User) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO users (
                user_id, platform_user_id, username, points, is_vip, created_at, last_seen
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.platform_user_id)
        .bind(&user.username)
        .bind(user.points)
        .bind(user.is_vip)
        .bind(user.created_at)
        .bind(user.last_seen)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, user_id: Uuid) -> Result<Option<User>, Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, platform_user_id, username, points, is_vip, created_at, last_seen
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_by_platform_user_id(&self, platform_user_id: &str) -> Result<Option<User>, Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, platform_user_id, username, points, is_vip, created_at, last_seen
            FROM users
            WHERE platform_user_id = $1
            "#,
        )
        .bind(platform_user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update(&self, user: &User) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET username = $1,
                points = $2,
                is_vip = $3,
                last_seen = $4
            WHERE user_id = $5
            "#,
        )
        .bind(&user.username)
        .bind(user.points)
        .bind(user.is_vip)
        .bind(user.last_seen)
        .bind(user.user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_or_create(&self, platform_user_id: &str, username: &str) -> Result<User, Error> {
        // Single round trip: first sight inserts, otherwise the username and
        // last_seen are refreshed in place.
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                user_id, platform_user_id, username, points, is_vip, created_at, last_seen
            )
            VALUES ($1, $2, $3, 0, FALSE, $4, $4)
            ON CONFLICT (platform_user_id) DO UPDATE
               SET username = EXCLUDED.username,
                   last_seen = EXCLUDED.last_seen
            RETURNING user_id, platform_user_id, username, points, is_vip, created_at, last_seen
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(platform_user_id)
        .bind(username)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }
}
