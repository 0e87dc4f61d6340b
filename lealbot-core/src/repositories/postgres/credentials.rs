use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use lealbot_common::models::credential::BotCredential;
use lealbot_common::traits::repository_traits::CredentialsRepository;
use crate::crypto::Encryptor;
use crate::Error;

/// Credentials store. Access and refresh tokens go through the `Encryptor`
/// on every write and read; nothing encrypted ever leaves this module.
#[derive(Clone)]
pub struct PostgresCredentialsRepository {
    pool: Pool<Postgres>,
    encryptor: Encryptor,
}

const CREDENTIAL_COLUMNS: &str = r#"
    credential_id,
    platform_user_id,
    user_name,
    access_token,
    refresh_token,
    scopes,
    expires_at,
    is_active,
    created_at,
    updated_at
"#;

impl PostgresCredentialsRepository {
    pub fn new(pool: Pool<Postgres>, encryptor: Encryptor) -> Self {
        Self { pool, encryptor }
    }

    fn row_to_credential(&self, r: &PgRow) -> Result<BotCredential, Error> {
        let access_token = self.encryptor.decrypt(r.try_get("access_token")?)?;
        let refresh_token = self.encryptor.decrypt(r.try_get("refresh_token")?)?;

        Ok(BotCredential {
            credential_id: r.try_get("credential_id")?,
            platform_user_id: r.try_get("platform_user_id")?,
            user_name: r.try_get("user_name")?,
            access_token,
            refresh_token,
            scopes: r.try_get::<Vec<String>, _>("scopes")?,
            expires_at: r.try_get::<DateTime<Utc>, _>("expires_at")?,
            is_active: r.try_get("is_active")?,
            created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: r.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }
}

#[async_trait]
impl CredentialsRepository for PostgresCredentialsRepository {
    async fn store_credentials(&self, creds: &BotCredential) -> Result<(), Error> {
        let encrypted_access = self.encryptor.encrypt(&creds.access_token)?;
        let encrypted_refresh = self.encryptor.encrypt(&creds.refresh_token)?;

        sqlx::query(
            r#"
            INSERT INTO bot_credentials (
                credential_id,
                platform_user_id,
                user_name,
                access_token,
                refresh_token,
                scopes,
                expires_at,
                is_active,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (platform_user_id) DO UPDATE
               SET credential_id = EXCLUDED.credential_id,
                   user_name     = EXCLUDED.user_name,
                   access_token  = EXCLUDED.access_token,
                   refresh_token = EXCLUDED.refresh_token,
                   scopes        = EXCLUDED.scopes,
                   expires_at    = EXCLUDED.expires_at,
                   is_active     = EXCLUDED.is_active,
                   created_at    = EXCLUDED.created_at,
                   updated_at    = EXCLUDED.updated_at
            "#,
        )
        .bind(creds.credential_id)
        .bind(&creds.platform_user_id)
        .bind(&creds.user_name)
        .bind(encrypted_access)
        .bind(encrypted_refresh)
        .bind(&creds.scopes)
        .bind(creds.expires_at)
        .bind(creds.is_active)
        .bind(creds.created_at)
        .bind(creds.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_credential_by_id(&self, credential_id: uuid::Uuid) -> Result<Option<BotCredential>, Error> {
        let row = sqlx::query(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM bot_credentials WHERE credential_id = $1"
        ))
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(self.row_to_credential(&r)?)),
            None => Ok(None),
        }
    }

    async fn get_credential_by_user_name(&self, user_name: &str) -> Result<Option<BotCredential>, Error> {
        let row = sqlx::query(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM bot_credentials WHERE LOWER(user_name) = LOWER($1)"
        ))
        .bind(user_name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(self.row_to_credential(&r)?)),
            None => Ok(None),
        }
    }

    async fn update_credentials(&self, creds: &BotCredential) -> Result<(), Error> {
        let encrypted_access = self.encryptor.encrypt(&creds.access_token)?;
        let encrypted_refresh = self.encryptor.encrypt(&creds.refresh_token)?;

        sqlx::query(
            r#"
            UPDATE bot_credentials
            SET user_name     = $1,
                access_token  = $2,
                refresh_token = $3,
                scopes        = $4,
                expires_at    = $5,
                is_active     = $6,
                updated_at    = $7
            WHERE credential_id = $8
            "#,
        )
        .bind(&creds.user_name)
        .bind(encrypted_access)
        .bind(encrypted_refresh)
        .bind(&creds.scopes)
        .bind(creds.expires_at)
        .bind(creds.is_active)
        .bind(creds.updated_at)
        .bind(creds.credential_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_active_credentials(&self) -> Result<Vec<BotCredential>, Error> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CREDENTIAL_COLUMNS}
            FROM bot_credentials
            WHERE is_active = TRUE
            ORDER BY updated_at DESC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for r in rows {
            results.push(self.row_to_credential(&r)?);
        }
        Ok(results)
    }

    async fn get_expiring_credentials(&self, within: Duration) -> Result<Vec<BotCredential>, Error> {
        let cutoff = Utc::now() + within;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {CREDENTIAL_COLUMNS}
            FROM bot_credentials
            WHERE is_active = TRUE
              AND expires_at <= $1
            ORDER BY expires_at ASC
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for r in rows {
            results.push(self.row_to_credential(&r)?);
        }
        Ok(results)
    }

    async fn set_credential_active(&self, credential_id: uuid::Uuid, is_active: bool) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE bot_credentials
            SET is_active = $1,
                updated_at = $2
            WHERE credential_id = $3
            "#,
        )
        .bind(is_active)
        .bind(Utc::now())
        .bind(credential_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
