//! Chunk Planner
//!
//! Splits documents longer than the analysis window into consecutive page windows.
//! The window size comes from the external analyzer's own size/time limits: documents
//! at or below it are analysed in a single pass.
//!
//! Page ranges always partition `[1, page_count]`. A document that cannot be
//! page-counted becomes one degenerate chunk with `chunkable = false`, and fusion
//! skips cross-chunk reasoning for it.

pub mod pdf;

pub use pdf::{count_pages, ChunkingError, PdfPages};

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::types::{Chunk, PageRange, SourceDocument};

/// Planned chunks for one document
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    pub chunks: Vec<Chunk>,
    pub page_count: Option<u32>,
    /// False when page counting failed
    pub chunkable: bool,
}

impl ChunkPlan {
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

/// Decides whether and how a document is split before analysis
#[derive(Debug, Clone, Copy)]
pub struct ChunkPlanner {
    window: u32,
}

impl ChunkPlanner {
    /// Window below 1 is clamped to 1
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
        }
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    /// Plan chunks for `document`
    ///
    /// CPU-bound for large PDFs; callers on the async runtime should use
    /// `spawn_blocking`.
    pub fn plan(&self, document: &SourceDocument) -> ChunkPlan {
        if document.is_image() {
            debug!(document_id = %document.id(), "Image upload, single page");
            return self.single(document, Some(1));
        }

        if !document.is_pdf() {
            warn!(
                document_id = %document.id(),
                mime_type = document.mime_type(),
                "Unsupported type for page counting, analysing as one unit"
            );
            return self.degenerate(document);
        }

        let pages = match PdfPages::load(document.bytes()) {
            Ok(pages) => pages,
            Err(e) => {
                warn!(document_id = %document.id(), "Cannot page-count PDF: {}", e);
                return self.degenerate(document);
            }
        };

        let page_count = pages.page_count();
        if page_count <= self.window {
            debug!(
                document_id = %document.id(),
                page_count,
                "Document fits in one analysis window"
            );
            return self.single(document, Some(page_count));
        }

        let ranges = partition(page_count, self.window);
        info!(
            document_id = %document.id(),
            page_count,
            window = self.window,
            chunks = ranges.len(),
            "Splitting document into page windows"
        );

        let chunks = ranges
            .into_iter()
            .enumerate()
            .map(|(i, range)| {
                let payload: Arc<[u8]> = match pages.extract(range) {
                    Ok(bytes) => Arc::from(bytes),
                    Err(e) => {
                        // Still analysable: the analyzer sees the full file but the chunk
                        // keeps its page range for voting and labelling.
                        warn!(document_id = %document.id(), "{}; sending whole file", e);
                        document.shared_bytes()
                    }
                };
                Chunk {
                    index: i as u32 + 1,
                    pages: Some(range),
                    payload,
                    mime_type: "application/pdf".to_string(),
                    document_id: document.id(),
                }
            })
            .collect();

        ChunkPlan {
            chunks,
            page_count: Some(page_count),
            chunkable: true,
        }
    }

    fn single(&self, document: &SourceDocument, page_count: Option<u32>) -> ChunkPlan {
        ChunkPlan {
            chunks: vec![Chunk {
                index: 1,
                pages: page_count.map(|n| PageRange::new(1, n)),
                payload: document.shared_bytes(),
                mime_type: document.mime_type().to_string(),
                document_id: document.id(),
            }],
            page_count,
            chunkable: true,
        }
    }

    fn degenerate(&self, document: &SourceDocument) -> ChunkPlan {
        ChunkPlan {
            chunkable: false,
            ..self.single(document, None)
        }
    }
}

/// Partition pages `1..=page_count` into consecutive windows of `window` pages
///
/// The last window may be shorter. Returns an empty list for zero pages.
pub fn partition(page_count: u32, window: u32) -> Vec<PageRange> {
    let window = window.max(1);
    let mut ranges = Vec::with_capacity(page_count.div_ceil(window) as usize);
    let mut first = 1;
    while first <= page_count {
        let last = (first + window - 1).min(page_count);
        ranges.push(PageRange::new(first, last));
        first = last + 1;
    }
    ranges
}
