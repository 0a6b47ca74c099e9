//! Post-fusion checks: identity gating and advisory duplicate detection

pub mod duplicate;
pub mod identity;

pub use duplicate::{normalize_document_number, LookupError, RecordLookup};
pub use identity::{names_match, normalize_name};
