//! Document record queries

use async_trait::async_trait;
use chrono::Utc;
use shipdocs_common::Result;
use sqlx::SqlitePool;

use crate::types::DocumentCategory;
use crate::validators::{normalize_document_number, LookupError, RecordLookup};

/// Persist a record
///
/// Fails with a database error when the entity already has a record with the same
/// normalised document number.
pub async fn insert_record(
    pool: &SqlitePool,
    record_id: &str,
    entity_id: &str,
    document_number: &str,
    category: DocumentCategory,
    file_name: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documents (
            id, entity_id, document_number, document_number_norm,
            category, file_name, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record_id)
    .bind(entity_id)
    .bind(document_number.trim())
    .bind(normalize_document_number(document_number))
    .bind(category.as_str())
    .bind(file_name)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Duplicate lookup over the `documents` table
#[derive(Clone)]
pub struct SqliteRecordLookup {
    pool: SqlitePool,
}

impl SqliteRecordLookup {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordLookup for SqliteRecordLookup {
    async fn find_by_document_number(
        &self,
        entity_id: &str,
        normalized_number: &str,
    ) -> std::result::Result<Option<String>, LookupError> {
        sqlx::query_scalar::<_, String>(
            "SELECT id FROM documents WHERE entity_id = ? AND document_number_norm = ? LIMIT 1",
        )
        .bind(entity_id)
        .bind(normalized_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LookupError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::duplicate;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        // Single connection: every in-memory connection is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_lookup_matches_normalised_number_in_scope() {
        let pool = memory_pool().await;
        insert_record(
            &pool,
            "rec-1",
            "ship-1",
            " A/25/772 ",
            DocumentCategory::Certificate,
            "cert.pdf",
        )
        .await
        .unwrap();

        let lookup = SqliteRecordLookup::new(pool);
        assert_eq!(
            lookup
                .find_by_document_number("ship-1", "a/25/772")
                .await
                .unwrap()
                .as_deref(),
            Some("rec-1")
        );
        assert_eq!(
            lookup
                .find_by_document_number("ship-2", "a/25/772")
                .await
                .unwrap(),
            None
        );

        let outcome = duplicate::check(Some("a/25/772"), "ship-1", &lookup).await;
        assert!(outcome.is_duplicate);
    }

    #[tokio::test]
    async fn test_unique_index_rejects_second_record() {
        let pool = memory_pool().await;
        insert_record(&pool, "rec-1", "ship-1", "TR-001", DocumentCategory::TestReport, "a.pdf")
            .await
            .unwrap();

        let second =
            insert_record(&pool, "rec-2", "ship-1", "tr-001", DocumentCategory::TestReport, "b.pdf")
                .await;
        assert!(second.is_err());

        // Same number under another entity is fine
        insert_record(&pool, "rec-3", "ship-2", "TR-001", DocumentCategory::TestReport, "c.pdf")
            .await
            .unwrap();
    }
}
