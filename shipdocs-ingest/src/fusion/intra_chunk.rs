//! Intra-chunk fusion: AI reading vs pattern reading for one chunk
//!
//! Confidence rule for header/footer fields:
//! both agree ⇒ high, one source ⇒ medium, both disagree ⇒ low (AI value kept),
//! neither ⇒ none. Prose fields have one possible source: medium or none.

use std::collections::BTreeMap;

use crate::extractors::ChunkExtraction;
use crate::types::{ConfidenceTier, DocumentField, FieldCandidate, FusedField, SourceTier};

/// Case-insensitive, whitespace-collapsed comparison form
pub fn normalize_value(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn values_agree(a: &str, b: &str) -> bool {
    normalize_value(a) == normalize_value(b)
}

/// Apply the confidence rule to one field's two readings
pub fn fuse_pair(
    field: DocumentField,
    ai: Option<&str>,
    pattern: Option<&str>,
) -> (Option<String>, ConfidenceTier, SourceTier) {
    let ai = ai.map(str::trim).filter(|v| !v.is_empty());
    let pattern = pattern
        .map(str::trim)
        .filter(|v| !v.is_empty() && field.is_header_footer());

    match (ai, pattern) {
        (Some(a), Some(p)) if values_agree(a, p) => {
            (Some(a.to_string()), ConfidenceTier::High, SourceTier::Both)
        }
        (Some(a), Some(_)) => (Some(a.to_string()), ConfidenceTier::Low, SourceTier::AiSummary),
        (Some(a), None) => (
            Some(a.to_string()),
            ConfidenceTier::Medium,
            SourceTier::AiSummary,
        ),
        (None, Some(p)) => (
            Some(p.to_string()),
            ConfidenceTier::Medium,
            SourceTier::PatternReader,
        ),
        (None, None) => (None, ConfidenceTier::None, SourceTier::None),
    }
}

fn first_value(candidates: &[FieldCandidate], field: DocumentField) -> Option<&str> {
    candidates
        .iter()
        .find(|c| c.field == field)
        .map(|c| c.value.as_str())
}

/// Fused fields of one chunk
#[derive(Debug, Clone)]
pub struct ChunkFields {
    pub chunk_index: u32,
    pub fields: BTreeMap<DocumentField, FusedField>,
}

/// Fuse every catalogue field for one chunk
pub fn fuse_chunk(extraction: &ChunkExtraction) -> ChunkFields {
    let fields = DocumentField::ALL
        .into_iter()
        .map(|field| {
            let (value, confidence, source) = fuse_pair(
                field,
                first_value(&extraction.ai_candidates, field),
                first_value(&extraction.pattern_candidates, field),
            );
            let contributing_chunks = if value.is_some() {
                vec![extraction.chunk_index]
            } else {
                Vec::new()
            };
            (
                field,
                FusedField {
                    field,
                    value,
                    confidence,
                    source,
                    contributing_chunks,
                },
            )
        })
        .collect();

    ChunkFields {
        chunk_index: extraction.chunk_index,
        fields,
    }
}
