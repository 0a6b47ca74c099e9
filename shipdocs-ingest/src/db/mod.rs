//! Database access for shipdocs-ingest
//!
//! The shared SQLite record store. Records are created by the caller between Phase 1
//! and Phase 2; this service reads them for the advisory duplicate check.

pub mod records;

pub use records::{insert_record, SqliteRecordLookup};

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Connects to the shared shipdocs.db in the root folder, creating it if missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the `documents` table if it doesn't exist
///
/// The UNIQUE index on `(entity_id, document_number_norm)` is the authoritative
/// duplicate guard; the pipeline's lookup is only advisory.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            entity_id TEXT NOT NULL,
            document_number TEXT NOT NULL,
            document_number_norm TEXT NOT NULL,
            category TEXT NOT NULL,
            file_name TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_entity_number
            ON documents (entity_id, document_number_norm)
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (documents)");

    Ok(())
}
