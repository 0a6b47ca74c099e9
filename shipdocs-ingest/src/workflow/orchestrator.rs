//! Phase 2: upload orchestration
//!
//! Starts only after the caller has created its record and reports the record id.
//! Uploads the original bytes and the merged summary as two artifacts. A failure
//! after record creation is never rolled back: the document stays pending in
//! PARTIALLY_UPLOADED and a retry uploads only the artifacts still missing.

use chrono::Utc;
use serde::Deserialize;
use shipdocs_common::events::{EventBus, IngestEvent};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{DocumentState, PendingRegistry};
use crate::boundary::{ArtifactStore, StoragePath, StoragePayload};
use crate::error::IngestError;
use crate::types::{Classification, DocumentField, StoredArtifact, UploadManifest};

/// Phase 2 trigger from the caller
#[derive(Debug, Clone, Deserialize)]
pub struct UploadRequest {
    pub record_id: String,
    /// Storage folder name; defaults to the expected entity's name
    #[serde(default)]
    pub entity_name: Option<String>,
    /// Upload even though the document number already exists
    #[serde(default)]
    pub allow_duplicate: bool,
}

#[derive(Debug, Clone)]
pub enum UploadOutcome {
    Complete(UploadManifest),
    /// Record exists, at least one artifact is missing; retry is possible
    Partial {
        manifest: UploadManifest,
        missing: Vec<String>,
        message: String,
    },
}

impl UploadOutcome {
    pub fn manifest(&self) -> &UploadManifest {
        match self {
            Self::Complete(manifest) | Self::Partial { manifest, .. } => manifest,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    /// Partial success as the labelled `UploadPartialFailure`
    pub fn into_result(self) -> Result<UploadManifest, IngestError> {
        match self {
            Self::Complete(manifest) => Ok(manifest),
            Self::Partial {
                manifest,
                missing,
                message,
            } => Err(IngestError::UploadPartialFailure {
                record_id: manifest.record_id,
                missing,
                message,
            }),
        }
    }
}

pub struct UploadOrchestrator {
    store: Arc<dyn ArtifactStore>,
    pending: PendingRegistry,
    events: EventBus,
}

impl UploadOrchestrator {
    pub fn new(store: Arc<dyn ArtifactStore>, pending: PendingRegistry, events: EventBus) -> Self {
        Self {
            store,
            pending,
            events,
        }
    }

    /// Run (or retry) Phase 2 for a pending document
    pub async fn upload(
        &self,
        document_id: Uuid,
        request: UploadRequest,
    ) -> Result<UploadOutcome, IngestError> {
        let record_id = request.record_id.trim().to_string();
        if record_id.is_empty() {
            return Err(IngestError::InvalidDocument(
                "record_id is required to start the upload".to_string(),
            ));
        }

        // Claim the document: the UPLOADING state blocks a concurrent second upload
        let snapshot = self
            .pending
            .update(document_id, |pending| {
                if pending.validation.classification == Classification::Reject {
                    return Err(IngestError::IdentityMismatchBlocking {
                        expected: pending.expected.imo.clone().unwrap_or_default(),
                        extracted: pending
                            .merged
                            .value(DocumentField::ImoNumber)
                            .unwrap_or_default()
                            .to_string(),
                    });
                }
                if pending.duplicate.is_duplicate && !request.allow_duplicate {
                    return Err(IngestError::DuplicateDetected {
                        existing_record_id: pending
                            .duplicate
                            .existing_record_id
                            .clone()
                            .unwrap_or_default(),
                    });
                }
                if let Some(existing) = &pending.manifest {
                    if existing.record_id != record_id {
                        return Err(IngestError::InvalidDocument(format!(
                            "document is already attached to record {}",
                            existing.record_id
                        )));
                    }
                }

                pending.state = pending.state.transition(DocumentState::Uploading)?;
                let original_sha256 = pending.document.content_sha256().to_string();
                let manifest = pending.manifest.get_or_insert_with(|| UploadManifest {
                    document_id,
                    record_id: record_id.clone(),
                    original_sha256,
                    original: None,
                    summary: None,
                    started_at: Utc::now(),
                    completed_at: None,
                });
                Ok((
                    pending.document.clone(),
                    pending.expected.name.clone(),
                    pending.merged.summary.clone(),
                    manifest.clone(),
                ))
            })
            .await?;
        let (document, expected_name, summary, mut manifest) = snapshot;

        let entity_name = request
            .entity_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(expected_name);
        let path = StoragePath::for_category(entity_name, document.category());

        info!(
            document_id = %document_id,
            record_id = %record_id,
            path = %path.display_path(),
            retry = manifest.original.is_some() || manifest.summary.is_some(),
            "Phase 2 upload starting"
        );

        let mut failures: Vec<(String, String)> = Vec::new();

        if manifest.original.is_none() {
            let payload = StoragePayload::original(&document);
            let name = payload.file_name().to_string();
            match self.store.store(payload, &path).await {
                Ok(artifact) => manifest.original = Some(artifact),
                Err(e) => {
                    warn!(document_id = %document_id, "Original upload failed: {}", e);
                    failures.push((name, e.to_string()));
                }
            }
        }

        if manifest.summary.is_none() {
            let payload = StoragePayload::summary_text(&document, &summary);
            let name = payload.file_name().to_string();
            match self.store.store(payload, &path).await {
                Ok(artifact) => manifest.summary = Some(artifact),
                Err(e) => {
                    warn!(document_id = %document_id, "Summary upload failed: {}", e);
                    failures.push((name, e.to_string()));
                }
            }
        }

        if manifest.is_complete() {
            manifest.completed_at = Some(Utc::now());
        }
        let complete = manifest.is_complete();
        let final_manifest = manifest.clone();

        self.pending
            .update(document_id, move |pending| {
                let next = if complete {
                    DocumentState::Uploaded
                } else {
                    DocumentState::PartiallyUploaded
                };
                pending.state = pending.state.transition(next)?;
                pending.manifest = Some(manifest);
                Ok(())
            })
            .await?;

        if complete {
            // Source document released
            self.pending.remove(document_id).await;
            let file_id = |a: &Option<StoredArtifact>| {
                a.as_ref().map(|a| a.file_id.clone()).unwrap_or_default()
            };
            let original_file_id = file_id(&final_manifest.original);
            let summary_file_id = file_id(&final_manifest.summary);
            self.events.emit_lossy(IngestEvent::UploadCompleted {
                document_id,
                record_id: record_id.clone(),
                original_file_id,
                summary_file_id,
                timestamp: Utc::now(),
            });
            info!(document_id = %document_id, record_id = %record_id, "Phase 2 complete");
            return Ok(UploadOutcome::Complete(final_manifest));
        }

        let missing: Vec<String> = failures.iter().map(|(name, _)| name.clone()).collect();
        let message = failures
            .iter()
            .map(|(name, err)| format!("{}: {}", name, err))
            .collect::<Vec<_>>()
            .join("; ");
        error!(
            document_id = %document_id,
            record_id = %record_id,
            missing = ?missing,
            "Phase 2 partially failed, document kept for retry"
        );
        self.events.emit_lossy(IngestEvent::UploadPartiallyFailed {
            document_id,
            record_id,
            message: message.clone(),
        });

        Ok(UploadOutcome::Partial {
            manifest: final_manifest,
            missing,
            message,
        })
    }

    /// Caller gave up on a pending document
    pub async fn abandon(&self, document_id: Uuid) -> Result<(), IngestError> {
        self.pending
            .update(document_id, |pending| {
                pending.state = pending.state.transition(DocumentState::Abandoned)?;
                Ok(())
            })
            .await?;
        self.pending.remove(document_id).await;

        info!(document_id = %document_id, "Pending document abandoned");
        self.events
            .emit_lossy(IngestEvent::DocumentAbandoned { document_id });
        Ok(())
    }
}
