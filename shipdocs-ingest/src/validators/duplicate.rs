//! Advisory duplicate detection
//!
//! Compares trimmed, case-folded document numbers within one entity scope through an
//! injected [`RecordLookup`]. The result is a hint: the lookup is unlocked, and the
//! record store's unique index is the authoritative guard.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::DuplicateOutcome;

#[derive(Debug, Error)]
#[error("Record lookup failed: {0}")]
pub struct LookupError(pub String);

/// Read access to persisted records
#[async_trait]
pub trait RecordLookup: Send + Sync {
    /// Id of an existing record in `entity_id` whose normalised number equals `normalized_number`
    async fn find_by_document_number(
        &self,
        entity_id: &str,
        normalized_number: &str,
    ) -> Result<Option<String>, LookupError>;
}

pub fn normalize_document_number(number: &str) -> String {
    number.trim().to_lowercase()
}

/// Check whether `document_number` already exists for `entity_scope`
///
/// An empty number is never a duplicate and the lookup is not called. A lookup
/// failure degrades to an unchecked outcome.
pub async fn check(
    document_number: Option<&str>,
    entity_scope: &str,
    lookup: &dyn RecordLookup,
) -> DuplicateOutcome {
    let normalized = document_number
        .map(normalize_document_number)
        .unwrap_or_default();
    if normalized.is_empty() {
        debug!(entity_id = entity_scope, "No document number, duplicate check skipped");
        return DuplicateOutcome::unique();
    }

    match lookup
        .find_by_document_number(entity_scope, &normalized)
        .await
    {
        Ok(Some(existing_record_id)) => {
            warn!(
                entity_id = entity_scope,
                document_number = %normalized,
                existing_record_id = %existing_record_id,
                "Document number already recorded"
            );
            DuplicateOutcome {
                is_duplicate: true,
                existing_record_id: Some(existing_record_id),
                checked: true,
            }
        }
        Ok(None) => DuplicateOutcome::unique(),
        Err(e) => {
            warn!(entity_id = entity_scope, "{}; treating as unchecked", e);
            DuplicateOutcome::not_checked()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MapLookup {
        records: HashMap<(String, String), String>,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl RecordLookup for MapLookup {
        async fn find_by_document_number(
            &self,
            entity_id: &str,
            normalized_number: &str,
        ) -> Result<Option<String>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LookupError("database locked".to_string()));
            }
            Ok(self
                .records
                .get(&(entity_id.to_string(), normalized_number.to_string()))
                .cloned())
        }
    }

    fn lookup_with(entity: &str, number: &str, record: &str) -> MapLookup {
        let mut lookup = MapLookup::default();
        lookup
            .records
            .insert((entity.to_string(), number.to_string()), record.to_string());
        lookup
    }

    #[tokio::test]
    async fn test_existing_number_is_duplicate() {
        let lookup = lookup_with("ship-1", "a/25/772", "rec-9");
        let outcome = check(Some("  A/25/772 "), "ship-1", &lookup).await;

        assert!(outcome.is_duplicate);
        assert_eq!(outcome.existing_record_id.as_deref(), Some("rec-9"));
        assert!(outcome.checked);
    }

    #[tokio::test]
    async fn test_scope_is_per_entity() {
        let lookup = lookup_with("ship-2", "a/25/772", "rec-9");
        let outcome = check(Some("A/25/772"), "ship-1", &lookup).await;
        assert!(!outcome.is_duplicate);
    }

    #[tokio::test]
    async fn test_empty_number_skips_lookup() {
        let lookup = MapLookup::default();
        let outcome = check(Some("   "), "ship-1", &lookup).await;
        assert!(!outcome.is_duplicate);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);

        let outcome = check(None, "ship-1", &lookup).await;
        assert!(!outcome.is_duplicate);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_unchecked() {
        let lookup = MapLookup {
            fail: true,
            ..Default::default()
        };
        let outcome = check(Some("TR-001"), "ship-1", &lookup).await;
        assert!(!outcome.is_duplicate);
        assert!(!outcome.checked);
    }
}
