//! Test helper utilities
//!
//! Fake boundaries for driving the pipeline without network or OCR tools. Test PDFs
//! carry an integer `Tag` on every page (its page number), so the fakes can tell
//! which chunk they were handed regardless of completion order.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};
use lopdf::{dictionary, Document, Object};
use shipdocs_common::events::EventBus;
use shipdocs_ingest::boundary::{
    AnalysisAction, AnalysisPayload, ArtifactStore, BoundaryError, DocumentAnalyzer,
    StorageCommand, StorageReceipt,
};
use shipdocs_ingest::chunking::ChunkPlanner;
use shipdocs_ingest::extractors::{
    AiSummaryExtractor, DualExtractor, HeaderFooterReader, PageRenderer, PatternReadError,
    SummaryFieldParser, TextRecognizer,
};
use shipdocs_ingest::types::{DocumentCategory, EntityKind, ExpectedEntity, SourceDocument};
use shipdocs_ingest::validators::{LookupError, RecordLookup};
use shipdocs_ingest::workflow::Pipeline;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Rendered page height; bands are 30px (header) and 24px (footer)
const PAGE_HEIGHT: u32 = 200;
const HEADER_HEIGHT: u32 = 30;

// ============================================================================
// PDFs
// ============================================================================

/// Minimal PDF with `pages` pages, each tagged with its page number
pub fn tagged_pdf(pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = (1..=pages)
        .map(|page| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Tag" => i64::from(page),
            })
            .into()
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => i64::from(pages),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Tag of the first page of a (chunk) PDF
pub fn first_page_tag(bytes: &[u8]) -> Option<u32> {
    let doc = Document::load_mem(bytes).ok()?;
    let (_, first_id) = doc.get_pages().into_iter().next()?;
    let page = doc.get_dictionary(first_id).ok()?;
    page.get(b"Tag")
        .ok()
        .and_then(|tag| tag.as_i64().ok())
        .map(|tag| tag as u32)
}

pub fn pdf_document(pages: u32, file_name: &str, category: DocumentCategory) -> SourceDocument {
    SourceDocument::new(
        tagged_pdf(pages),
        "application/pdf",
        file_name,
        "ship-1",
        category,
    )
    .unwrap()
}

pub fn sea_star() -> ExpectedEntity {
    ExpectedEntity {
        id: "ship-1".to_string(),
        kind: EntityKind::Ship,
        name: "SEA STAR".to_string(),
        imo: Some("9123456".to_string()),
    }
}

// ============================================================================
// Analysis boundary
// ============================================================================

/// Replies keyed by the chunk's first page
#[derive(Default)]
pub struct ScriptedAnalyzer {
    replies: HashMap<u32, Result<String, String>>,
    /// Source file names whose chunks always fail
    failing_files: HashMap<String, String>,
    calls: AtomicUsize,
}

impl ScriptedAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, first_page: u32, summary: &str) -> Self {
        self.replies.insert(first_page, Ok(summary.to_string()));
        self
    }

    pub fn fail(mut self, first_page: u32, message: &str) -> Self {
        self.replies.insert(first_page, Err(message.to_string()));
        self
    }

    pub fn fail_file(mut self, file_name: &str, message: &str) -> Self {
        self.failing_files
            .insert(file_name.to_string(), message.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentAnalyzer for ScriptedAnalyzer {
    async fn analyze(
        &self,
        _action: AnalysisAction,
        payload: &AnalysisPayload,
    ) -> Result<String, BoundaryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((_, message)) = self
            .failing_files
            .iter()
            .find(|(name, _)| payload.file_name().starts_with(name.as_str()))
        {
            return Err(BoundaryError::Rejected(message.clone()));
        }
        let tag = first_page_tag(payload.bytes()).unwrap_or(1);
        match self.replies.get(&tag) {
            Some(Ok(summary)) => Ok(summary.clone()),
            Some(Err(message)) => Err(BoundaryError::Rejected(message.clone())),
            None => Err(BoundaryError::Timeout {
                boundary: "analysis",
                secs: 120,
            }),
        }
    }
}

// ============================================================================
// Pattern reader
// ============================================================================

/// Renders a blank page whose width is the first page's tag
pub struct TaggedRenderer;

#[async_trait]
impl PageRenderer for TaggedRenderer {
    async fn render_first_page(
        &self,
        payload: &[u8],
        _mime_type: &str,
    ) -> Result<DynamicImage, PatternReadError> {
        let tag = first_page_tag(payload)
            .ok_or_else(|| PatternReadError::Render("untagged payload".to_string()))?;
        Ok(DynamicImage::new_rgb8(tag, PAGE_HEIGHT))
    }
}

/// Render that never completes, like a wedged `pdftoppm`
pub struct HungRenderer;

#[async_trait]
impl PageRenderer for HungRenderer {
    async fn render_first_page(
        &self,
        _payload: &[u8],
        _mime_type: &str,
    ) -> Result<DynamicImage, PatternReadError> {
        std::future::pending().await
    }
}

/// Band text keyed by the chunk's first page
#[derive(Default)]
pub struct ScriptedRecognizer {
    headers: HashMap<u32, String>,
    footers: HashMap<u32, String>,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, first_page: u32, text: &str) -> Self {
        self.headers.insert(first_page, text.to_string());
        self
    }

    pub fn footer(mut self, first_page: u32, text: &str) -> Self {
        self.footers.insert(first_page, text.to_string());
        self
    }
}

#[async_trait]
impl TextRecognizer for ScriptedRecognizer {
    async fn recognize(&self, band: &DynamicImage) -> Result<String, PatternReadError> {
        let (tag, height) = band.dimensions();
        let texts = if height == HEADER_HEIGHT {
            &self.headers
        } else {
            &self.footers
        };
        Ok(texts.get(&tag).cloned().unwrap_or_default())
    }
}

/// Pipeline over the fakes, chunk window `window`
pub fn pipeline(
    window: u32,
    analyzer: Arc<dyn DocumentAnalyzer>,
    recognizer: Option<ScriptedRecognizer>,
    events: EventBus,
) -> Pipeline {
    let ai = AiSummaryExtractor::new(analyzer, Arc::new(SummaryFieldParser));
    let pattern = recognizer.map(|recognizer| {
        HeaderFooterReader::new(Arc::new(TaggedRenderer), Arc::new(recognizer), 0.15, 0.12)
    });
    Pipeline::new(ChunkPlanner::new(window), DualExtractor::new(ai, pattern), events)
}

/// Pipeline whose pattern reader uses `renderer` with a read deadline of `timeout`
pub fn pipeline_with_renderer(
    window: u32,
    analyzer: Arc<dyn DocumentAnalyzer>,
    renderer: Arc<dyn PageRenderer>,
    timeout: Duration,
    events: EventBus,
) -> Pipeline {
    let ai = AiSummaryExtractor::new(analyzer, Arc::new(SummaryFieldParser));
    let pattern = HeaderFooterReader::new(renderer, Arc::new(ScriptedRecognizer::new()), 0.15, 0.12)
        .with_timeout(timeout);
    Pipeline::new(
        ChunkPlanner::new(window),
        DualExtractor::new(ai, Some(pattern)),
        events,
    )
}

// ============================================================================
// Storage boundary
// ============================================================================

/// In-memory store; uploads of file names in `failing` are refused
#[derive(Default)]
pub struct MemoryStore {
    failing: Mutex<HashSet<String>>,
    uploads: Mutex<Vec<(String, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_uploads_of(&self, file_name: &str) {
        self.failing.lock().unwrap().insert(file_name.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// `(file_name, folder)` per successful upload, in call order
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn execute(&self, command: StorageCommand) -> Result<StorageReceipt, BoundaryError> {
        match command {
            StorageCommand::UploadFile { path, payload } => {
                let name = payload.file_name().to_string();
                if self.failing.lock().unwrap().contains(&name) {
                    return Err(BoundaryError::Status {
                        status: 503,
                        body: "storage unavailable".to_string(),
                    });
                }
                let mut uploads = self.uploads.lock().unwrap();
                uploads.push((name, path.display_path()));
                Ok(StorageReceipt {
                    file_id: Some(format!("file-{}", uploads.len())),
                    web_link: None,
                })
            }
            other => Err(BoundaryError::Rejected(format!(
                "unexpected {}",
                other.action().as_wire()
            ))),
        }
    }
}

// ============================================================================
// Record lookup
// ============================================================================

/// Records keyed by `(entity_id, normalised number)`
#[derive(Default)]
pub struct MapLookup {
    records: HashMap<(String, String), String>,
}

impl MapLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, entity_id: &str, normalized_number: &str, record_id: &str) -> Self {
        self.records.insert(
            (entity_id.to_string(), normalized_number.to_string()),
            record_id.to_string(),
        );
        self
    }
}

#[async_trait]
impl RecordLookup for MapLookup {
    async fn find_by_document_number(
        &self,
        entity_id: &str,
        normalized_number: &str,
    ) -> Result<Option<String>, LookupError> {
        Ok(self
            .records
            .get(&(entity_id.to_string(), normalized_number.to_string()))
            .cloned())
    }
}
