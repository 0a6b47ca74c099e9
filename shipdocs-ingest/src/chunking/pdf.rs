//! PDF page counting and page-range extraction using lopdf

use lopdf::{Document, Object};
use thiserror::Error;

use crate::types::PageRange;

#[derive(Debug, Error)]
pub enum ChunkingError {
    #[error("PDF could not be parsed: {0}")]
    Parse(String),

    #[error("PDF has no pages")]
    NoPages,

    #[error("Failed to write pages {range}: {message}")]
    Write { range: PageRange, message: String },
}

/// Parsed PDF kept in memory for repeated page-range extraction
pub struct PdfPages {
    doc: Document,
    page_count: u32,
}

impl PdfPages {
    pub fn load(bytes: &[u8]) -> Result<Self, ChunkingError> {
        let doc = Document::load_mem(bytes).map_err(|e| ChunkingError::Parse(e.to_string()))?;
        let page_count = doc.get_pages().len() as u32;
        if page_count == 0 {
            return Err(ChunkingError::NoPages);
        }
        Ok(Self { doc, page_count })
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Write a standalone PDF holding only `range`
    pub fn extract(&self, range: PageRange) -> Result<Vec<u8>, ChunkingError> {
        let write_err = |message: String| ChunkingError::Write { range, message };

        let mut doc = self.doc.clone();
        let outside: Vec<u32> = (1..=self.page_count)
            .filter(|p| !range.contains(*p))
            .collect();
        doc.delete_pages(&outside);
        doc.prune_objects();

        let kept = doc.get_pages().len() as u32;
        if kept != range.len() {
            return Err(write_err(format!(
                "expected {} pages after split, found {}",
                range.len(),
                kept
            )));
        }
        fix_root_page_count(&mut doc, kept);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| write_err(e.to_string()))?;
        Ok(buffer)
    }
}

/// `delete_pages` leaves the root /Count untouched
fn fix_root_page_count(doc: &mut Document, count: u32) {
    let pages_id = match doc
        .catalog()
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
    {
        Ok(id) => id,
        Err(_) => return,
    };

    if let Ok(pages) = doc.get_object_mut(pages_id).and_then(Object::as_dict_mut) {
        pages.set("Count", i64::from(count));
    }
}

/// Count pages without keeping the parsed document
pub fn count_pages(bytes: &[u8]) -> Result<u32, ChunkingError> {
    PdfPages::load(bytes).map(|p| p.page_count())
}
