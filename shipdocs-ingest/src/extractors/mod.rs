//! Per-chunk readers
//!
//! - [`ai_summary`]: analysis boundary summary, then field extraction from the text
//! - [`pattern_reader`]: first-page header/footer bands, OCR, per-category regexes
//! - [`dual`]: runs both concurrently and reports which succeeded

pub mod ai_summary;
pub mod dual;
pub mod pattern_reader;

pub use ai_summary::{AiReading, AiSummaryExtractor, FieldExtractor, ModelFieldExtractor, SummaryFieldParser};
pub use dual::{ChunkExtraction, DualExtractor, ExtractionStatus};
pub use pattern_reader::{
    HeaderFooterReader, PageRenderer, PatternReadError, PdftoppmRenderer, TesseractRecognizer,
    TextRecognizer,
};
