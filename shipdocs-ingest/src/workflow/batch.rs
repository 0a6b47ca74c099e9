//! Multi-document batches
//!
//! Each document runs the full Phase 1 pipeline independently. Starts are staggered
//! to stay under the analysis boundary's rate limits; one document's failure does
//! not affect the others. Results come back in input order.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info};

use super::{AnalyzedDocument, Pipeline};
use crate::error::IngestError;
use crate::types::{ExpectedEntity, SourceDocument};
use crate::validators::RecordLookup;

/// One document of a batch with the entity it is uploaded against
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub document: SourceDocument,
    pub expected: ExpectedEntity,
}

pub async fn run_batch(
    pipeline: Arc<Pipeline>,
    lookup: Arc<dyn RecordLookup>,
    items: Vec<BatchItem>,
    stagger: Duration,
) -> Vec<Result<AnalyzedDocument, IngestError>> {
    let total = items.len();
    info!(documents = total, stagger_ms = stagger.as_millis() as u64, "Starting batch");

    let mut tasks = JoinSet::new();
    for (position, item) in items.into_iter().enumerate() {
        if position > 0 && !stagger.is_zero() {
            tokio::time::sleep(stagger).await;
        }
        let pipeline = Arc::clone(&pipeline);
        let lookup = Arc::clone(&lookup);
        tasks.spawn(async move {
            let result = pipeline
                .analyze(item.document, item.expected, lookup.as_ref())
                .await;
            (position, result)
        });
    }

    let mut slots: Vec<Option<Result<AnalyzedDocument, IngestError>>> =
        (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((position, result)) => slots[position] = Some(result),
            Err(e) => error!("Batch task aborted: {}", e),
        }
    }

    let results: Vec<_> = slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                Err(IngestError::Internal(
                    "document analysis task aborted".to_string(),
                ))
            })
        })
        .collect();

    let failed = results.iter().filter(|r| r.is_err()).count();
    info!(documents = total, failed, "Batch complete");
    results
}
