//! SQLite pool creation and schema.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub type DbPool = SqlitePool;
pub type DbRow = sqlx::sqlite::SqliteRow;

mod schema;

pub use schema::SCHEMA;

/// Opens a pool for `database_url` and makes sure the schema exists.
pub async fn init_db(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory pool. Every connection to `:memory:` is a
/// separate database, so the one connection is kept alive for the pool's life.
pub async fn init_memory_db() -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &DbPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA.iter().copied() {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!(statements = SCHEMA.len(), "Database schema ensured");
    Ok(())
}
