//! Error types for shipdocs-ingest
//!
//! Two layers:
//! - [`IngestError`]: labelled pipeline failures (never a generic error for a pipeline stop)
//! - [`ApiError`]: HTTP mapping with a JSON body `{ "error": { "code", "message" } }`
//!
//! Non-fatal conditions (low confidence, name warnings, advisory duplicates, degraded
//! readers) are not errors; they travel as [`crate::workflow::IngestNotice`]s.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::workflow::DocumentState;

/// Pipeline error taxonomy
#[derive(Debug, Error)]
pub enum IngestError {
    /// Upload rejected before analysis (empty, missing owner, undecodable)
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// AI boundary unreachable or timed out for a call
    #[error("Analysis unavailable: {0}")]
    AnalysisUnavailable(String),

    /// Page rendering or header/footer pattern matching failed
    #[error("Pattern read failure: {0}")]
    PatternReadFailure(String),

    /// Both readers failed on every chunk
    #[error("Extraction failed for document {document_id}: all {chunk_count} chunk(s) failed on both readers")]
    ExtractionFailed { document_id: Uuid, chunk_count: usize },

    /// Extracted IMO differs from the selected ship
    #[error("IMO mismatch: document belongs to IMO {extracted}, expected {expected}")]
    IdentityMismatchBlocking { expected: String, extracted: String },

    /// Document number already recorded for this entity
    #[error("Duplicate document number for this entity (existing record {existing_record_id})")]
    DuplicateDetected { existing_record_id: String },

    /// Record exists but at least one artifact was not stored
    #[error("Upload partially failed for record {record_id}: missing {missing:?}: {message}")]
    UploadPartialFailure {
        record_id: String,
        missing: Vec<String>,
        message: String,
    },

    /// Lifecycle step requested out of order
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: DocumentState,
        to: DocumentState,
    },

    /// No pending document with this id
    #[error("Document not found: {0}")]
    NotFound(Uuid),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::InvalidDocument(_) => "INVALID_DOCUMENT",
            IngestError::AnalysisUnavailable(_) => "ANALYSIS_UNAVAILABLE",
            IngestError::PatternReadFailure(_) => "PATTERN_READ_FAILURE",
            IngestError::ExtractionFailed { .. } => "EXTRACTION_FAILED",
            IngestError::IdentityMismatchBlocking { .. } => "IDENTITY_MISMATCH_BLOCKING",
            IngestError::DuplicateDetected { .. } => "DUPLICATE_DETECTED",
            IngestError::UploadPartialFailure { .. } => "UPLOAD_PARTIAL_FAILURE",
            IngestError::InvalidTransition { .. } => "INVALID_TRANSITION",
            IngestError::NotFound(_) => "NOT_FOUND",
            IngestError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Pipeline outcome that blocks the request
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Ingest(ref err) => {
                let status = match err {
                    IngestError::InvalidDocument(_) => StatusCode::BAD_REQUEST,
                    IngestError::NotFound(_) => StatusCode::NOT_FOUND,
                    IngestError::ExtractionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    IngestError::IdentityMismatchBlocking { .. }
                    | IngestError::DuplicateDetected { .. }
                    | IngestError::InvalidTransition { .. } => StatusCode::CONFLICT,
                    IngestError::AnalysisUnavailable(_) => StatusCode::BAD_GATEWAY,
                    IngestError::UploadPartialFailure { .. } => StatusCode::BAD_GATEWAY,
                    IngestError::PatternReadFailure(_) | IngestError::Internal(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, err.code(), err.to_string())
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
