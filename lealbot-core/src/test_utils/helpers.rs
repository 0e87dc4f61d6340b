// File: lealbot-core/src/test_utils/helpers.rs

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use crate::{Database, Error};

/// Create a connection pool to the test DB.
/// By default looks for `TEST_DATABASE_URL` in env,
/// else uses `postgres://lealbot@localhost/lealbot_test`.
pub async fn create_test_db_pool() -> Result<Pool<Postgres>, Error> {
    let url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://lealbot@localhost/lealbot_test".to_string());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    Ok(pool)
}

/// Wipes out test data so each test can start fresh.
pub async fn clean_database(pool: &Pool<Postgres>) -> Result<(), Error> {
    sqlx::query(
        r#"
        TRUNCATE TABLE
            ledger_entries,
            processed_events,
            redemptions,
            offers,
            bot_credentials,
            users
        RESTART IDENTITY CASCADE;
    "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns a fully migrated, empty Database.
pub async fn setup_test_database() -> Result<Database, Error> {
    let pool = create_test_db_pool().await?;
    let db = Database::from_pool(pool);
    db.migrate().await?;
    clean_database(db.pool()).await?;
    Ok(db)
}
