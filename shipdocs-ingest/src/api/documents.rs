//! Document API handlers
//!
//! POST /documents/analyze, POST /documents/analyze/batch, GET /documents/{id},
//! POST /documents/{id}/upload, DELETE /documents/{id}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, IngestError};
use crate::types::{DocumentCategory, ExpectedEntity, SourceDocument, UploadManifest};
use crate::workflow::{
    run_batch, AnalysisReport, AnalyzedDocument, BatchItem, DocumentState, UploadOutcome,
    UploadRequest,
};
use crate::AppState;

/// One uploaded document
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub file_name: String,
    /// Sniffed from the content when absent
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data_base64: String,
    pub category: DocumentCategory,
    /// Entity the user selected for this upload
    pub expected: ExpectedEntity,
}

impl AnalyzeRequest {
    fn into_item(self) -> Result<BatchItem, IngestError> {
        let bytes = general_purpose::STANDARD
            .decode(self.data_base64.trim())
            .map_err(|e| {
                IngestError::InvalidDocument(format!(
                    "'{}' is not valid base64: {}",
                    self.file_name, e
                ))
            })?;
        let document = SourceDocument::new(
            bytes,
            self.mime_type.unwrap_or_default(),
            self.file_name,
            self.expected.id.clone(),
            self.category,
        )?;
        Ok(BatchItem {
            document,
            expected: self.expected,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchAnalyzeRequest {
    pub documents: Vec<AnalyzeRequest>,
}

/// Per-document result of a batch, in request order
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchEntry {
    Analyzed(AnalysisReport),
    Failed { code: String, message: String },
}

#[derive(Debug, Serialize)]
pub struct BatchAnalyzeResponse {
    pub results: Vec<BatchEntry>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document_id: Uuid,
    pub state: DocumentState,
    pub manifest: UploadManifest,
    /// Artifacts still missing after a partial failure
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Retain a Phase 1 result for Phase 2 and produce the caller's view
async fn retain(state: &AppState, analyzed: AnalyzedDocument) -> AnalysisReport {
    let report = analyzed.report();
    if !state.pending.insert(analyzed).await {
        tracing::info!(
            document_id = %report.document_id,
            state = %report.state,
            "Terminal document not retained"
        );
    }
    report
}

/// POST /documents/analyze
///
/// Phase 1 for one document. A blocking identity mismatch is returned as a report in
/// the REJECTED state; total extraction failure is an error response.
pub async fn analyze_document(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<AnalysisReport>> {
    let item = request.into_item()?;

    match state
        .pipeline
        .analyze(item.document, item.expected, state.lookup.as_ref())
        .await
    {
        Ok(analyzed) => Ok(Json(retain(&state, analyzed).await)),
        Err(e) => {
            state.record_error(e.to_string()).await;
            Err(e.into())
        }
    }
}

/// POST /documents/analyze/batch
///
/// Every document runs independently; one failure never fails the batch.
pub async fn analyze_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchAnalyzeRequest>,
) -> ApiResult<Json<BatchAnalyzeResponse>> {
    if request.documents.is_empty() {
        return Err(ApiError::BadRequest("batch contains no documents".to_string()));
    }

    let mut entries: Vec<Option<BatchEntry>> = Vec::with_capacity(request.documents.len());
    let mut positions = Vec::new();
    let mut items = Vec::new();
    for (position, document) in request.documents.into_iter().enumerate() {
        match document.into_item() {
            Ok(item) => {
                positions.push(position);
                items.push(item);
                entries.push(None);
            }
            Err(e) => entries.push(Some(failed_entry(&e))),
        }
    }

    let results = run_batch(
        Arc::clone(&state.pipeline),
        Arc::clone(&state.lookup),
        items,
        state.config.batch_stagger(),
    )
    .await;

    for (position, result) in positions.into_iter().zip(results) {
        let entry = match result {
            Ok(analyzed) => BatchEntry::Analyzed(retain(&state, analyzed).await),
            Err(e) => {
                state.record_error(e.to_string()).await;
                failed_entry(&e)
            }
        };
        entries[position] = Some(entry);
    }

    let results = entries
        .into_iter()
        .map(|entry| {
            entry.unwrap_or_else(|| BatchEntry::Failed {
                code: "INTERNAL_ERROR".to_string(),
                message: "no result for document".to_string(),
            })
        })
        .collect();

    Ok(Json(BatchAnalyzeResponse { results }))
}

fn failed_entry(error: &IngestError) -> BatchEntry {
    BatchEntry::Failed {
        code: error.code().to_string(),
        message: error.to_string(),
    }
}

/// GET /documents/{id}
pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> ApiResult<Json<AnalysisReport>> {
    let pending = state
        .pending
        .get(document_id)
        .await
        .ok_or(IngestError::NotFound(document_id))?;
    Ok(Json(pending.report()))
}

/// POST /documents/{id}/upload
///
/// Phase 2, called after the caller created its record. Partial success answers
/// 207 with the manifest so far; the same request can be retried.
pub async fn upload_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(request): Json<UploadRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.orchestrator.upload(document_id, request).await?;

    let response = match outcome {
        UploadOutcome::Complete(manifest) => (
            StatusCode::OK,
            Json(UploadResponse {
                document_id,
                state: DocumentState::Uploaded,
                manifest,
                missing: Vec::new(),
                message: None,
            }),
        ),
        UploadOutcome::Partial {
            manifest,
            missing,
            message,
        } => {
            state.record_error(message.clone()).await;
            (
                StatusCode::MULTI_STATUS,
                Json(UploadResponse {
                    document_id,
                    state: DocumentState::PartiallyUploaded,
                    manifest,
                    missing,
                    message: Some(message),
                }),
            )
        }
    };

    Ok(response)
}

/// DELETE /documents/{id}
pub async fn abandon_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.orchestrator.abandon(document_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Build document routes
pub fn document_routes() -> Router<AppState> {
    Router::new()
        .route("/documents/analyze", post(analyze_document))
        .route("/documents/analyze/batch", post(analyze_batch))
        .route(
            "/documents/:id",
            get(get_document).delete(abandon_document),
        )
        .route("/documents/:id/upload", post(upload_document))
}
