//! Core data model for the ingestion pipeline
//!
//! Documents flow through the pipeline as:
//! - [`SourceDocument`] (immutable upload) → [`Chunk`]s (page windows)
//! - [`FieldCandidate`]s per chunk and source → [`FusedField`]s
//! - one [`MergedDocument`] → [`ValidationOutcome`] + [`DuplicateOutcome`]
//! - after the caller persists the record: [`UploadManifest`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::IngestError;

// ============================================================================
// Source documents
// ============================================================================

/// Regulatory document category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    Certificate,
    SurveyReport,
    TestReport,
    Passport,
    CrewCertificate,
    Other,
}

impl DocumentCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Certificate => "certificate",
            Self::SurveyReport => "survey_report",
            Self::TestReport => "test_report",
            Self::Passport => "passport",
            Self::CrewCertificate => "crew_certificate",
            Self::Other => "other",
        }
    }

    /// Folder label used on the storage boundary
    pub fn folder_label(self) -> &'static str {
        match self {
            Self::Certificate => "Certificates",
            Self::SurveyReport => "Survey Reports",
            Self::TestReport => "Test Reports",
            Self::Passport => "Passports",
            Self::CrewCertificate => "Crew Certificates",
            Self::Other => "Other Documents",
        }
    }

    /// Optional parent folder the category folder is nested under
    pub fn parent_folder(self) -> Option<&'static str> {
        match self {
            Self::SurveyReport | Self::TestReport => Some("Reports"),
            Self::Passport | Self::CrewCertificate => Some("Crew Documents"),
            Self::Certificate | Self::Other => None,
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uploaded document, immutable once accepted
///
/// Bytes are shared (`Arc`) so chunk tasks and the upload phase can hold the
/// document without copying it.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    id: Uuid,
    bytes: Arc<[u8]>,
    mime_type: String,
    file_name: String,
    owner_id: String,
    category: DocumentCategory,
    content_sha256: String,
    received_at: DateTime<Utc>,
}

impl SourceDocument {
    /// Accept an upload
    ///
    /// A generic declared MIME type (`application/octet-stream` or empty) is replaced
    /// by the type sniffed from the content when one can be recognised.
    pub fn new(
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
        file_name: impl Into<String>,
        owner_id: impl Into<String>,
        category: DocumentCategory,
    ) -> Result<Self, IngestError> {
        let file_name = file_name.into();
        let owner_id = owner_id.into();

        if bytes.is_empty() {
            return Err(IngestError::InvalidDocument(format!(
                "'{}' is empty",
                file_name
            )));
        }
        if owner_id.trim().is_empty() {
            return Err(IngestError::InvalidDocument(
                "owning entity id is required".to_string(),
            ));
        }

        let mut mime_type = mime_type.into().trim().to_ascii_lowercase();
        if mime_type.is_empty() || mime_type == "application/octet-stream" {
            if let Some(kind) = infer::get(&bytes) {
                mime_type = kind.mime_type().to_string();
            } else if mime_type.is_empty() {
                mime_type = "application/octet-stream".to_string();
            }
        }

        let content_sha256 = format!("{:x}", Sha256::digest(&bytes));

        Ok(Self {
            id: Uuid::new_v4(),
            bytes: Arc::from(bytes),
            mime_type,
            file_name,
            owner_id,
            category,
            content_sha256,
            received_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the bytes
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn category(&self) -> DocumentCategory {
        self.category
    }

    pub fn content_sha256(&self) -> &str {
        &self.content_sha256
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == "application/pdf" || self.bytes.starts_with(b"%PDF-")
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// File name without its extension
    pub fn file_stem(&self) -> &str {
        match self.file_name.rfind('.') {
            Some(pos) if pos > 0 => &self.file_name[..pos],
            _ => &self.file_name,
        }
    }
}

/// Entity the user is uploading against
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpectedEntity {
    /// Entity id, also the duplicate-check scope
    pub id: String,
    pub kind: EntityKind,
    /// Vessel name or crew member's full name
    pub name: String,
    /// IMO number (ships only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imo: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Ship,
    Crew,
}

// ============================================================================
// Chunks
// ============================================================================

/// Inclusive, 1-based page range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRange {
    pub first: u32,
    pub last: u32,
}

impl PageRange {
    pub fn new(first: u32, last: u32) -> Self {
        debug_assert!(first >= 1 && first <= last);
        Self { first, last }
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u32 {
        self.last - self.first + 1
    }

    pub fn contains(&self, page: u32) -> bool {
        page >= self.first && page <= self.last
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "Page {}", self.first)
        } else {
            write!(f, "Pages {}-{}", self.first, self.last)
        }
    }
}

/// Contiguous page window of a source document, analysed independently
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 1-based chunk index
    pub index: u32,
    /// `None` when the document could not be page-counted
    pub pages: Option<PageRange>,
    pub payload: Arc<[u8]>,
    pub mime_type: String,
    pub document_id: Uuid,
}

impl Chunk {
    /// Human label used in summaries and logs
    pub fn label(&self) -> String {
        match self.pages {
            Some(range) => range.to_string(),
            None => "Whole document".to_string(),
        }
    }

    /// Origin recorded on candidates read from this chunk
    pub fn origin(&self) -> ChunkOrigin {
        match self.pages {
            Some(_) => ChunkOrigin::Chunk(self.index),
            None => ChunkOrigin::WholeDocument,
        }
    }
}

// ============================================================================
// Fields
// ============================================================================

/// How competing values across chunks are elected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// First chunk's non-empty value is authoritative
    Name,
    /// Most frequent value wins, ties to the lowest chunk index
    Number,
}

/// Field catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentField {
    DocumentNumber,
    ReportForm,
    DocumentName,
    ShipName,
    ImoNumber,
    IssueDate,
    ExpiryDate,
    IssuingAuthority,
    HolderName,
}

impl DocumentField {
    pub const ALL: [DocumentField; 9] = [
        DocumentField::DocumentNumber,
        DocumentField::ReportForm,
        DocumentField::DocumentName,
        DocumentField::ShipName,
        DocumentField::ImoNumber,
        DocumentField::IssueDate,
        DocumentField::ExpiryDate,
        DocumentField::IssuingAuthority,
        DocumentField::HolderName,
    ];

    /// Fields that must be populated before a record can be created without manual entry
    pub const REQUIRED: [DocumentField; 2] =
        [DocumentField::DocumentNumber, DocumentField::DocumentName];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DocumentNumber => "document_number",
            Self::ReportForm => "report_form",
            Self::DocumentName => "document_name",
            Self::ShipName => "ship_name",
            Self::ImoNumber => "imo_number",
            Self::IssueDate => "issue_date",
            Self::ExpiryDate => "expiry_date",
            Self::IssuingAuthority => "issuing_authority",
            Self::HolderName => "holder_name",
        }
    }

    /// Parse a snake_case field key
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL.into_iter().find(|f| f.as_str() == key)
    }

    /// Human label for digests
    pub fn label(self) -> &'static str {
        match self {
            Self::DocumentNumber => "Document number",
            Self::ReportForm => "Report form",
            Self::DocumentName => "Document name",
            Self::ShipName => "Ship name",
            Self::ImoNumber => "IMO number",
            Self::IssueDate => "Issue date",
            Self::ExpiryDate => "Expiry date",
            Self::IssuingAuthority => "Issuing authority",
            Self::HolderName => "Holder name",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Self::DocumentName | Self::ShipName | Self::IssuingAuthority | Self::HolderName => {
                FieldKind::Name
            }
            Self::DocumentNumber
            | Self::ReportForm
            | Self::ImoNumber
            | Self::IssueDate
            | Self::ExpiryDate => FieldKind::Number,
        }
    }

    /// Fields the header/footer pattern reader can recover
    pub fn is_header_footer(self) -> bool {
        matches!(self, Self::DocumentNumber | Self::ReportForm)
    }
}

impl fmt::Display for DocumentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which reader produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    AiSummary,
    PatternReader,
}

/// Where a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkOrigin {
    Chunk(u32),
    WholeDocument,
}

/// One reading of one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCandidate {
    pub field: DocumentField,
    pub value: String,
    pub source: CandidateSource,
    pub origin: ChunkOrigin,
}

/// Agreement strength behind a single field value
///
/// Ordered so that `None < Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    None,
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Which sources back a fused value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    Both,
    AiSummary,
    PatternReader,
    None,
}

impl SourceTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Both => "both",
            Self::AiSummary => "ai_summary",
            Self::PatternReader => "pattern_reader",
            Self::None => "none",
        }
    }
}

/// Field value after fusion
///
/// `value` is `None` exactly when `confidence` is [`ConfidenceTier::None`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusedField {
    pub field: DocumentField,
    pub value: Option<String>,
    pub confidence: ConfidenceTier,
    pub source: SourceTier,
    /// Chunk indices whose reading supports the elected value
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributing_chunks: Vec<u32>,
}

impl FusedField {
    pub fn empty(field: DocumentField) -> Self {
        Self {
            field,
            value: None,
            confidence: ConfidenceTier::None,
            source: SourceTier::None,
            contributing_chunks: Vec::new(),
        }
    }
}

/// Fused result for one source document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedDocument {
    pub document_id: Uuid,
    /// Every catalogue field is present, possibly with `none` confidence
    pub fields: BTreeMap<DocumentField, FusedField>,
    /// Field digest followed by each chunk's raw summary, for audit/manual review
    pub summary: String,
    pub page_count: Option<u32>,
    pub chunk_count: usize,
    /// Chunks excluded from voting after both readers failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_chunks: Vec<u32>,
}

impl MergedDocument {
    pub fn field(&self, field: DocumentField) -> Option<&FusedField> {
        self.fields.get(&field)
    }

    pub fn value(&self, field: DocumentField) -> Option<&str> {
        self.fields.get(&field).and_then(|f| f.value.as_deref())
    }

    pub fn confidence(&self, field: DocumentField) -> ConfidenceTier {
        self.fields
            .get(&field)
            .map(|f| f.confidence)
            .unwrap_or(ConfidenceTier::None)
    }

    /// Required fields the caller must present as editable (none/low confidence)
    pub fn manual_entry_required(&self) -> Vec<DocumentField> {
        DocumentField::REQUIRED
            .into_iter()
            .filter(|f| self.confidence(*f) <= ConfidenceTier::Low)
            .collect()
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Identity validation classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Accept,
    AcceptWithWarning,
    Reject,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::AcceptWithWarning => "accept_with_warning",
            Self::Reject => "reject",
        }
    }
}

/// Result of comparing extracted identity against the expected entity
///
/// A `None` match flag means the extraction made no assertion for that field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub imo_match: Option<bool>,
    pub name_match: Option<bool>,
    pub classification: Classification,
    /// Normalised Levenshtein similarity of the compared names, for reviewers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_similarity: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

/// Advisory duplicate check result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateOutcome {
    pub is_duplicate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_record_id: Option<String>,
    /// False when the lookup could not run (lookup failure, rejected document)
    pub checked: bool,
}

impl DuplicateOutcome {
    pub fn unique() -> Self {
        Self {
            is_duplicate: false,
            existing_record_id: None,
            checked: true,
        }
    }

    pub fn not_checked() -> Self {
        Self {
            is_duplicate: false,
            existing_record_id: None,
            checked: false,
        }
    }
}

/// One artifact written through the storage boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub file_id: String,
    pub file_name: String,
    pub storage_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_link: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// Phase 2 result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadManifest {
    pub document_id: Uuid,
    pub record_id: String,
    pub original_sha256: String,
    pub original: Option<StoredArtifact>,
    pub summary: Option<StoredArtifact>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadManifest {
    pub fn is_complete(&self) -> bool {
        self.original.is_some() && self.summary.is_some()
    }
}
