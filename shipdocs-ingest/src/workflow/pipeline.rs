//! Phase 1 pipeline
//!
//! Runs one document through planning, dual extraction, fusion, identity validation
//! and the advisory duplicate check. Nothing is persisted here.
//!
//! # Error Handling
//! - Per-chunk isolation: a chunk whose readers both fail is excluded from voting
//! - Graceful degradation: one failed reader lowers confidence instead of failing
//! - Early stop only on total extraction failure (`Err`) or a blocking IMO mismatch
//!   (`Ok` in the REJECTED state, no duplicate check)

use chrono::Utc;
use futures::future::join_all;
use shipdocs_common::events::{EventBus, IngestEvent};
use tracing::{error, info, warn};

use super::{AnalyzedDocument, ChunkStatus, DocumentState, IngestNotice};
use crate::chunking::{ChunkPlan, ChunkPlanner};
use crate::error::IngestError;
use crate::extractors::{ChunkExtraction, DualExtractor};
use crate::fusion::fuse_document;
use crate::types::{Classification, DocumentField, DuplicateOutcome, ExpectedEntity, SourceDocument};
use crate::validators::{duplicate, identity, RecordLookup};

/// Phase 1 orchestrator
pub struct Pipeline {
    planner: ChunkPlanner,
    extractor: DualExtractor,
    events: EventBus,
}

impl Pipeline {
    pub fn new(planner: ChunkPlanner, extractor: DualExtractor, events: EventBus) -> Self {
        Self {
            planner,
            extractor,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Analyse one document against the entity the user selected
    pub async fn analyze(
        &self,
        document: SourceDocument,
        expected: ExpectedEntity,
        lookup: &dyn RecordLookup,
    ) -> Result<AnalyzedDocument, IngestError> {
        let document_id = document.id();
        info!(
            document_id = %document_id,
            file_name = document.file_name(),
            category = %document.category(),
            entity_id = %expected.id,
            bytes = document.bytes().len(),
            "Analysing document"
        );
        self.events.emit_lossy(IngestEvent::DocumentReceived {
            document_id,
            file_name: document.file_name().to_string(),
            category: document.category().to_string(),
            timestamp: Utc::now(),
        });

        // Planning: lopdf parsing is CPU-bound
        let plan = self.plan(&document).await?;
        self.events.emit_lossy(IngestEvent::ChunksPlanned {
            document_id,
            page_count: plan.page_count,
            chunk_count: plan.chunk_count(),
            chunkable: plan.chunkable,
        });

        // Extraction: every chunk, both readers, joined before fusion
        let extractions = self.extract_all(&document, &plan).await;
        let mut notices = chunk_notices(&extractions);
        let chunks = extractions
            .iter()
            .map(|e| ChunkStatus {
                chunk_index: e.chunk_index,
                pages: e.pages,
                status: e.status,
            })
            .collect();

        // Fusion
        let merged = match fuse_document(document_id, &plan, &extractions) {
            Ok(merged) => merged,
            Err(e) => {
                error!(document_id = %document_id, "{}", e);
                self.events.emit_lossy(IngestEvent::DocumentFailed {
                    document_id,
                    message: e.to_string(),
                });
                return Err(e);
            }
        };
        let manual_entry = merged.manual_entry_required();
        self.events.emit_lossy(IngestEvent::FusionCompleted {
            document_id,
            field_count: merged
                .fields
                .values()
                .filter(|f| f.value.is_some())
                .count(),
            manual_entry_required: manual_entry.iter().map(|f| f.as_str().to_string()).collect(),
        });
        if !manual_entry.is_empty() {
            notices.push(IngestNotice::LowConfidenceExtraction {
                fields: manual_entry,
            });
        }

        // Identity validation
        let validation = identity::validate(&merged, &expected);
        self.events.emit_lossy(IngestEvent::ValidationCompleted {
            document_id,
            classification: validation.classification.as_str().to_string(),
        });

        let mut state = DocumentState::Analyzed;
        if validation.classification == Classification::Reject {
            state = state.transition(DocumentState::Rejected)?;
            let message = validation.messages.join("; ");
            warn!(document_id = %document_id, "Blocking identity mismatch: {}", message);
            notices.push(IngestNotice::IdentityMismatchBlocking { message });
            return Ok(AnalyzedDocument {
                document,
                expected,
                merged,
                validation,
                duplicate: DuplicateOutcome::not_checked(),
                state,
                notices,
                chunks,
                manifest: None,
            });
        }
        state = state.transition(DocumentState::Validated)?;
        if validation.classification == Classification::AcceptWithWarning {
            notices.push(IngestNotice::IdentityMismatchWarning {
                message: validation.messages.join("; "),
                similarity: validation.name_similarity,
            });
        }

        // Advisory duplicate check
        let duplicate = duplicate::check(
            merged.value(DocumentField::DocumentNumber),
            &expected.id,
            lookup,
        )
        .await;
        state = state.transition(DocumentState::DuplicateChecked)?;
        self.events.emit_lossy(IngestEvent::DuplicateChecked {
            document_id,
            is_duplicate: duplicate.is_duplicate,
            existing_record_id: duplicate.existing_record_id.clone(),
        });
        match (&duplicate.existing_record_id, duplicate.checked) {
            (Some(existing), _) => notices.push(IngestNotice::DuplicateDetected {
                existing_record_id: existing.clone(),
            }),
            (None, false) => notices.push(IngestNotice::DuplicateCheckUnavailable),
            (None, true) => {}
        }

        info!(
            document_id = %document_id,
            state = %state,
            classification = validation.classification.as_str(),
            duplicate = duplicate.is_duplicate,
            "Phase 1 complete"
        );

        Ok(AnalyzedDocument {
            document,
            expected,
            merged,
            validation,
            duplicate,
            state,
            notices,
            chunks,
            manifest: None,
        })
    }

    async fn plan(&self, document: &SourceDocument) -> Result<ChunkPlan, IngestError> {
        let planner = self.planner;
        let document = document.clone();
        tokio::task::spawn_blocking(move || planner.plan(&document))
            .await
            .map_err(|e| IngestError::Internal(format!("chunk planning task failed: {}", e)))
    }

    async fn extract_all(&self, document: &SourceDocument, plan: &ChunkPlan) -> Vec<ChunkExtraction> {
        let category = document.category();
        let file_name = document.file_name();

        let tasks = plan.chunks.iter().map(|chunk| {
            async move {
                let extraction = self.extractor.extract(chunk, category, file_name).await;
                let (first_page, last_page) = chunk
                    .pages
                    .map(|r| (r.first, r.last))
                    .unwrap_or((0, 0));
                self.events.emit_lossy(IngestEvent::ChunkExtracted {
                    document_id: chunk.document_id,
                    chunk_index: chunk.index,
                    first_page,
                    last_page,
                    status: extraction.status.as_str().to_string(),
                });
                extraction
            }
        });

        join_all(tasks).await
    }
}

fn chunk_notices(extractions: &[ChunkExtraction]) -> Vec<IngestNotice> {
    let mut notices = Vec::new();
    for extraction in extractions {
        if extraction.is_failed() {
            notices.push(IngestNotice::ChunkExcluded {
                chunk_index: extraction.chunk_index,
            });
            continue;
        }
        if let Some(message) = &extraction.ai_error {
            notices.push(IngestNotice::AnalysisUnavailable {
                chunk_index: extraction.chunk_index,
                message: message.clone(),
            });
        }
        if let Some(message) = &extraction.pattern_error {
            notices.push(IngestNotice::PatternReadFailure {
                chunk_index: extraction.chunk_index,
                message: message.clone(),
            });
        }
    }
    notices
}
