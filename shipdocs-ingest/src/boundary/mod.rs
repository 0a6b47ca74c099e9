//! External boundaries
//!
//! Two isolated collaborators, each behind a narrow trait:
//! - [`DocumentAnalyzer`]: AI analysis only, never sees storage identifiers
//! - [`ArtifactStore`]: write-only file storage, never asked to analyse
//!
//! Actions are closed enums and only become wire strings inside the HTTP clients.
//! Payload bytes for the two boundaries are distinct newtypes so a chunk can never be
//! uploaded as an artifact by mistake.

pub mod analysis;
pub mod storage;

pub use analysis::HttpDocumentAnalyzer;
pub use storage::HttpArtifactStore;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::types::{Chunk, DocumentCategory, SourceDocument, StoredArtifact};

/// Boundary call failures
///
/// Every variant is the failure of one call; callers decide whether it degrades or aborts.
#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("{0} boundary endpoint is not configured")]
    NotConfigured(&'static str),

    #[error("{boundary} call timed out after {secs}s")]
    Timeout { boundary: &'static str, secs: u64 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Boundary answered `success: false`
    #[error("Boundary rejected request: {0}")]
    Rejected(String),

    #[error("Malformed boundary response: {0}")]
    Decode(String),
}

impl BoundaryError {
    /// Map a reqwest failure, keeping timeouts distinguishable
    pub(crate) fn from_reqwest(boundary: &'static str, secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BoundaryError::Timeout { boundary, secs }
        } else if err.is_decode() {
            BoundaryError::Decode(err.to_string())
        } else {
            BoundaryError::Transport(err.to_string())
        }
    }
}

/// File block shared by both wire formats
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WireFile {
    pub data_base64: String,
    pub mime_type: String,
    pub file_name: String,
}

fn wire_file(data: &[u8], mime_type: &str, file_name: &str) -> WireFile {
    WireFile {
        data_base64: general_purpose::STANDARD.encode(data),
        mime_type: mime_type.to_string(),
        file_name: file_name.to_string(),
    }
}

// ============================================================================
// Analysis boundary
// ============================================================================

/// Bytes destined for the analysis boundary
#[derive(Debug, Clone)]
pub struct AnalysisPayload {
    data: Arc<[u8]>,
    mime_type: String,
    file_name: String,
}

impl AnalysisPayload {
    /// Chunk payload, named after the source file and page range
    pub fn from_chunk(chunk: &Chunk, source_file_name: &str) -> Self {
        let file_name = match chunk.pages {
            Some(range) if range.first != 1 || chunk.index > 1 => {
                format!("{} (p{}-{})", source_file_name, range.first, range.last)
            }
            _ => source_file_name.to_string(),
        };
        Self {
            data: Arc::clone(&chunk.payload),
            mime_type: chunk.mime_type.clone(),
            file_name,
        }
    }

    /// Plain text sent for field extraction
    pub fn text(text: &str, file_name: impl Into<String>) -> Self {
        Self {
            data: Arc::from(text.as_bytes()),
            mime_type: "text/plain".to_string(),
            file_name: file_name.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn to_wire(&self) -> WireFile {
        wire_file(&self.data, &self.mime_type, &self.file_name)
    }
}

/// Analysis boundary actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisAction {
    AnalyzeCertificate,
    AnalyzeSurveyReport,
    AnalyzeTestReport,
    AnalyzePassport,
    AnalyzeCrewCertificate,
    AnalyzeDocument,
    /// Reasoning-model field extraction from summary text
    ExtractFields,
}

impl AnalysisAction {
    pub fn for_category(category: DocumentCategory) -> Self {
        match category {
            DocumentCategory::Certificate => Self::AnalyzeCertificate,
            DocumentCategory::SurveyReport => Self::AnalyzeSurveyReport,
            DocumentCategory::TestReport => Self::AnalyzeTestReport,
            DocumentCategory::Passport => Self::AnalyzePassport,
            DocumentCategory::CrewCertificate => Self::AnalyzeCrewCertificate,
            DocumentCategory::Other => Self::AnalyzeDocument,
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            Self::AnalyzeCertificate => "analyze_certificate",
            Self::AnalyzeSurveyReport => "analyze_survey_report",
            Self::AnalyzeTestReport => "analyze_test_report",
            Self::AnalyzePassport => "analyze_passport",
            Self::AnalyzeCrewCertificate => "analyze_crew_certificate",
            Self::AnalyzeDocument => "analyze_document",
            Self::ExtractFields => "extract_fields",
        }
    }
}

impl fmt::Display for AnalysisAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// AI analysis boundary
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Run `action` over `payload` and return the summary text
    async fn analyze(
        &self,
        action: AnalysisAction,
        payload: &AnalysisPayload,
    ) -> Result<String, BoundaryError>;
}

// ============================================================================
// Storage boundary
// ============================================================================

/// Bytes destined for the storage boundary
#[derive(Debug, Clone)]
pub struct StoragePayload {
    data: Arc<[u8]>,
    mime_type: String,
    file_name: String,
}

impl StoragePayload {
    /// The uploaded file, unchanged
    pub fn original(document: &SourceDocument) -> Self {
        Self {
            data: document.shared_bytes(),
            mime_type: document.mime_type().to_string(),
            file_name: document.file_name().to_string(),
        }
    }

    /// Merged summary artifact, `<stem>_summary.txt`
    pub fn summary_text(document: &SourceDocument, summary: &str) -> Self {
        Self {
            data: Arc::from(summary.as_bytes()),
            mime_type: "text/plain".to_string(),
            file_name: summary_file_name(document),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn to_wire(&self) -> WireFile {
        wire_file(&self.data, &self.mime_type, &self.file_name)
    }
}

pub fn summary_file_name(document: &SourceDocument) -> String {
    format!("{}_summary.txt", document.file_stem())
}

/// Destination folder on the storage boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoragePath {
    pub entity_name: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_category: Option<String>,
}

impl StoragePath {
    pub fn for_category(entity_name: impl Into<String>, category: DocumentCategory) -> Self {
        Self {
            entity_name: entity_name.into(),
            category: category.folder_label().to_string(),
            parent_category: category.parent_folder().map(str::to_string),
        }
    }

    /// `Entity/Parent/Category`
    pub fn display_path(&self) -> String {
        match &self.parent_category {
            Some(parent) => format!("{}/{}/{}", self.entity_name, parent, self.category),
            None => format!("{}/{}", self.entity_name, self.category),
        }
    }
}

/// Storage boundary actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageAction {
    UploadFile,
    CreateSubfolder,
    MoveFile,
    DeleteFile,
    RenameFile,
}

impl StorageAction {
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::UploadFile => "upload_file",
            Self::CreateSubfolder => "create_subfolder",
            Self::MoveFile => "move_file",
            Self::DeleteFile => "delete_file",
            Self::RenameFile => "rename_file",
        }
    }
}

/// One storage operation with its arguments
#[derive(Debug, Clone)]
pub enum StorageCommand {
    UploadFile {
        path: StoragePath,
        payload: StoragePayload,
    },
    CreateSubfolder {
        path: StoragePath,
    },
    MoveFile {
        path: StoragePath,
        file_id: String,
        target_path: String,
    },
    DeleteFile {
        path: StoragePath,
        file_id: String,
    },
    RenameFile {
        path: StoragePath,
        file_id: String,
        new_name: String,
    },
}

impl StorageCommand {
    pub fn action(&self) -> StorageAction {
        match self {
            Self::UploadFile { .. } => StorageAction::UploadFile,
            Self::CreateSubfolder { .. } => StorageAction::CreateSubfolder,
            Self::MoveFile { .. } => StorageAction::MoveFile,
            Self::DeleteFile { .. } => StorageAction::DeleteFile,
            Self::RenameFile { .. } => StorageAction::RenameFile,
        }
    }

    pub fn path(&self) -> &StoragePath {
        match self {
            Self::UploadFile { path, .. }
            | Self::CreateSubfolder { path }
            | Self::MoveFile { path, .. }
            | Self::DeleteFile { path, .. }
            | Self::RenameFile { path, .. } => path,
        }
    }
}

/// Successful storage response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageReceipt {
    pub file_id: Option<String>,
    pub web_link: Option<String>,
}

/// Write-only storage boundary
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn execute(&self, command: StorageCommand) -> Result<StorageReceipt, BoundaryError>;

    /// Upload one artifact under `path`
    async fn store(
        &self,
        payload: StoragePayload,
        path: &StoragePath,
    ) -> Result<StoredArtifact, BoundaryError> {
        let file_name = payload.file_name().to_string();
        let receipt = self
            .execute(StorageCommand::UploadFile {
                path: path.clone(),
                payload,
            })
            .await?;
        let file_id = receipt.file_id.ok_or_else(|| {
            BoundaryError::Decode(format!("upload of '{}' returned no file_id", file_name))
        })?;

        Ok(StoredArtifact {
            file_id,
            file_name,
            storage_path: path.display_path(),
            web_link: receipt.web_link,
            uploaded_at: Utc::now(),
        })
    }
}
