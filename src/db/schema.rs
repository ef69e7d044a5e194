//! Schema utilities
//!
//! Connectivity and schema checks run at startup, plus the bundled schema
//! used to prepare a fresh database.

use sqlx::{Executor, PgPool};

/// Bundled schema for accounts, entries and transfers
pub const SCHEMA_SQL: &str = include_str!("../../migrations/0001_init.sql");

/// Tables the ledger reads and writes
const REQUIRED_TABLES: [&str; 3] = ["accounts", "entries", "transfers"];

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}

/// Apply the bundled schema. Safe to run more than once.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Multi-statement text without bind parameters goes over the simple query protocol.
    pool.execute(SCHEMA_SQL).await?;
    tracing::info!("Schema applied");
    Ok(())
}
