//! Document workflow
//!
//! Phase 1 ([`pipeline`]) analyses, validates and duplicate-checks a document without
//! persisting anything. The caller then creates its record and triggers Phase 2
//! ([`orchestrator`]), which uploads the original and the merged summary.
//!
//! State machine:
//! ANALYZED → VALIDATED → DUPLICATE_CHECKED → UPLOADING → UPLOADED,
//! with REJECTED (blocking identity mismatch), PARTIALLY_UPLOADED (retryable) and
//! ABANDONED (caller gave up).

pub mod batch;
pub mod orchestrator;
pub mod pipeline;

pub use batch::{run_batch, BatchItem};
pub use orchestrator::{UploadOrchestrator, UploadOutcome, UploadRequest};
pub use pipeline::Pipeline;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::IngestError;
use crate::extractors::ExtractionStatus;
use crate::types::{
    DocumentCategory, DocumentField, DuplicateOutcome, ExpectedEntity, MergedDocument, PageRange,
    SourceDocument, UploadManifest, ValidationOutcome,
};

/// Per-document lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentState {
    Analyzed,
    Validated,
    DuplicateChecked,
    Uploading,
    Uploaded,
    Rejected,
    PartiallyUploaded,
    Abandoned,
}

impl DocumentState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analyzed => "ANALYZED",
            Self::Validated => "VALIDATED",
            Self::DuplicateChecked => "DUPLICATE_CHECKED",
            Self::Uploading => "UPLOADING",
            Self::Uploaded => "UPLOADED",
            Self::Rejected => "REJECTED",
            Self::PartiallyUploaded => "PARTIALLY_UPLOADED",
            Self::Abandoned => "ABANDONED",
        }
    }

    pub fn can_transition_to(self, next: DocumentState) -> bool {
        use DocumentState::*;
        matches!(
            (self, next),
            (Analyzed, Validated)
                | (Analyzed, Rejected)
                | (Validated, DuplicateChecked)
                | (DuplicateChecked, Uploading)
                | (Uploading, Uploaded)
                | (Uploading, PartiallyUploaded)
                | (PartiallyUploaded, Uploading)
                | (Analyzed, Abandoned)
                | (Validated, Abandoned)
                | (DuplicateChecked, Abandoned)
                | (PartiallyUploaded, Abandoned)
        )
    }

    pub fn transition(self, next: DocumentState) -> Result<DocumentState, IngestError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(IngestError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// No further transitions; the source document is released
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Uploaded | Self::Rejected | Self::Abandoned)
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal condition surfaced alongside a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestNotice {
    /// AI path failed for a chunk; prose fields may be empty
    AnalysisUnavailable { chunk_index: u32, message: String },
    /// Pattern path failed for a chunk; header/footer fields rely on AI alone
    PatternReadFailure { chunk_index: u32, message: String },
    /// Both paths failed; the chunk did not vote
    ChunkExcluded { chunk_index: u32 },
    /// Required fields the user must confirm or enter
    LowConfidenceExtraction { fields: Vec<DocumentField> },
    IdentityMismatchWarning {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        similarity: Option<f64>,
    },
    IdentityMismatchBlocking { message: String },
    DuplicateDetected { existing_record_id: String },
    DuplicateCheckUnavailable,
}

/// Chunk outcome line for reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkStatus {
    pub chunk_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<PageRange>,
    pub status: ExtractionStatus,
}

/// A document after Phase 1, retained until Phase 2 completes or the caller abandons it
#[derive(Debug, Clone)]
pub struct AnalyzedDocument {
    pub document: SourceDocument,
    pub expected: ExpectedEntity,
    pub merged: MergedDocument,
    pub validation: ValidationOutcome,
    pub duplicate: DuplicateOutcome,
    pub state: DocumentState,
    pub notices: Vec<IngestNotice>,
    pub chunks: Vec<ChunkStatus>,
    /// Set once Phase 2 has started
    pub manifest: Option<UploadManifest>,
}

impl AnalyzedDocument {
    pub fn id(&self) -> Uuid {
        self.document.id()
    }

    /// Serializable view returned to the caller
    pub fn report(&self) -> AnalysisReport {
        AnalysisReport {
            document_id: self.document.id(),
            file_name: self.document.file_name().to_string(),
            category: self.document.category(),
            entity_id: self.expected.id.clone(),
            state: self.state,
            merged: self.merged.clone(),
            manual_entry_required: self.merged.manual_entry_required(),
            validation: self.validation.clone(),
            duplicate: self.duplicate.clone(),
            chunks: self.chunks.clone(),
            notices: self.notices.clone(),
            manifest: self.manifest.clone(),
        }
    }
}

/// Phase 1 result as seen by the caller
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub document_id: Uuid,
    pub file_name: String,
    pub category: DocumentCategory,
    pub entity_id: String,
    pub state: DocumentState,
    pub merged: MergedDocument,
    pub manual_entry_required: Vec<DocumentField>,
    pub validation: ValidationOutcome,
    pub duplicate: DuplicateOutcome,
    pub chunks: Vec<ChunkStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<IngestNotice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<UploadManifest>,
}

/// Documents between Phase 1 and the end of Phase 2
///
/// Cheap to clone; all clones share one map.
#[derive(Clone, Default)]
pub struct PendingRegistry {
    inner: Arc<RwLock<HashMap<Uuid, AnalyzedDocument>>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retain a document; terminal documents are never retained
    pub async fn insert(&self, analyzed: AnalyzedDocument) -> bool {
        if analyzed.state.is_terminal() {
            return false;
        }
        self.inner.write().await.insert(analyzed.id(), analyzed);
        true
    }

    pub async fn get(&self, id: Uuid) -> Option<AnalyzedDocument> {
        self.inner.read().await.get(&id).cloned()
    }

    /// Mutate one entry under the write lock
    pub async fn update<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut AnalyzedDocument) -> Result<T, IngestError>,
    ) -> Result<T, IngestError> {
        let mut map = self.inner.write().await;
        let entry = map.get_mut(&id).ok_or(IngestError::NotFound(id))?;
        f(entry)
    }

    pub async fn remove(&self, id: Uuid) -> Option<AnalyzedDocument> {
        self.inner.write().await.remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DocumentState::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut state = Analyzed;
        for next in [Validated, DuplicateChecked, Uploading, Uploaded] {
            state = state.transition(next).unwrap();
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn test_partial_upload_is_retryable() {
        assert!(Uploading.can_transition_to(PartiallyUploaded));
        assert!(PartiallyUploaded.can_transition_to(Uploading));
        assert!(PartiallyUploaded.can_transition_to(Abandoned));
    }

    #[test]
    fn test_rejected_and_uploading_guards() {
        assert!(Analyzed.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Uploading));
        assert!(!Validated.can_transition_to(Uploading));
        assert!(!Uploading.can_transition_to(Uploading));
        assert!(!Uploading.can_transition_to(Abandoned));

        let err = Uploaded.transition(Uploading).unwrap_err();
        assert_eq!(err.to_string(), "Invalid state transition: UPLOADED -> UPLOADING");
    }

    #[test]
    fn test_state_wire_names() {
        assert_eq!(
            serde_json::to_value(DuplicateChecked).unwrap(),
            "DUPLICATE_CHECKED"
        );
    }
}
