//! Fusion engine
//!
//! Two stages, both pure:
//! 1. [`intra_chunk`]: AI vs pattern reading per chunk, assigning confidence
//! 2. [`inter_chunk`]: election across chunks by index
//!
//! Failed chunks are excluded from voting. The result depends only on chunk indices,
//! never on the order extractions completed in.

pub mod inter_chunk;
pub mod intra_chunk;
pub mod summary;

pub use inter_chunk::merge_chunks;
pub use intra_chunk::{fuse_chunk, fuse_pair, normalize_value, ChunkFields};
pub use summary::build_summary;

use tracing::{debug, info};
use uuid::Uuid;

use crate::chunking::ChunkPlan;
use crate::error::IngestError;
use crate::extractors::ChunkExtraction;
use crate::types::MergedDocument;

/// Fuse all chunk extractions of one document
///
/// Fails only when no chunk produced a reading from either source.
pub fn fuse_document(
    document_id: Uuid,
    plan: &ChunkPlan,
    extractions: &[ChunkExtraction],
) -> Result<MergedDocument, IngestError> {
    let mut failed_chunks: Vec<u32> = extractions
        .iter()
        .filter(|e| e.is_failed())
        .map(|e| e.chunk_index)
        .collect();
    failed_chunks.sort_unstable();

    let voting: Vec<ChunkFields> = extractions
        .iter()
        .filter(|e| !e.is_failed())
        .map(fuse_chunk)
        .collect();

    if voting.is_empty() {
        return Err(IngestError::ExtractionFailed {
            document_id,
            chunk_count: plan.chunk_count(),
        });
    }

    if !plan.chunkable {
        debug!(document_id = %document_id, "Unchunkable document, no cross-chunk reasoning");
    }

    // A single voter elects its own values, so one code path covers both cases
    let fields = merge_chunks(&voting);
    let summary = build_summary(&fields, extractions, plan.page_count);

    let merged = MergedDocument {
        document_id,
        fields,
        summary,
        page_count: plan.page_count,
        chunk_count: plan.chunk_count(),
        failed_chunks,
    };

    info!(
        document_id = %document_id,
        chunks = merged.chunk_count,
        failed = merged.failed_chunks.len(),
        manual_entry = merged.manual_entry_required().len(),
        "Fusion complete"
    );

    Ok(merged)
}
