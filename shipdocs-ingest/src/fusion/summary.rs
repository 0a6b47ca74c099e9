//! Merged summary artifact text
//!
//! A field digest followed by every chunk's raw AI summary labelled by page range.
//! Uploaded next to the original as `<stem>_summary.txt` for audit and manual review.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::extractors::ChunkExtraction;
use crate::types::{DocumentField, FusedField};

pub fn build_summary(
    fields: &BTreeMap<DocumentField, FusedField>,
    extractions: &[ChunkExtraction],
    page_count: Option<u32>,
) -> String {
    let mut out = String::new();

    out.push_str("EXTRACTED FIELDS\n");
    out.push_str("================\n");
    for field in DocumentField::ALL {
        let Some(fused) = fields.get(&field) else {
            continue;
        };
        match &fused.value {
            Some(value) => {
                let _ = writeln!(
                    out,
                    "{}: {} [{} confidence, source: {}]",
                    field.label(),
                    value,
                    fused.confidence.as_str(),
                    fused.source.as_str()
                );
            }
            None => {
                let _ = writeln!(out, "{}: (not found)", field.label());
            }
        }
    }

    let mut ordered: Vec<&ChunkExtraction> = extractions.iter().collect();
    ordered.sort_by_key(|e| e.chunk_index);

    let _ = writeln!(
        out,
        "\nPages: {}   Chunks analysed: {}",
        page_count.map_or_else(|| "unknown".to_string(), |n| n.to_string()),
        ordered.len()
    );

    for extraction in ordered {
        let _ = writeln!(out, "\n--- {} ---", extraction.label());
        match (&extraction.summary, &extraction.ai_error) {
            (Some(summary), _) => {
                out.push_str(summary.trim_end());
                out.push('\n');
            }
            (None, Some(error)) => {
                let _ = writeln!(out, "[AI summary unavailable: {}]", error);
            }
            (None, None) => out.push_str("[AI summary unavailable]\n"),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::ExtractionStatus;
    use crate::types::{ConfidenceTier, PageRange, SourceTier};

    fn extraction(index: u32, pages: PageRange, summary: Option<&str>) -> ChunkExtraction {
        ChunkExtraction {
            chunk_index: index,
            pages: Some(pages),
            summary: summary.map(str::to_string),
            ai_candidates: vec![],
            pattern_candidates: vec![],
            status: if summary.is_some() {
                ExtractionStatus::AiOnly
            } else {
                ExtractionStatus::PatternOnly
            },
            ai_error: summary.is_none().then(|| "timed out".to_string()),
            pattern_error: None,
        }
    }

    #[test]
    fn test_digest_then_chunks_in_page_order() {
        let mut fields: BTreeMap<DocumentField, FusedField> = DocumentField::ALL
            .into_iter()
            .map(|f| (f, FusedField::empty(f)))
            .collect();
        fields.insert(
            DocumentField::DocumentNumber,
            FusedField {
                field: DocumentField::DocumentNumber,
                value: Some("A/25/772".to_string()),
                confidence: ConfidenceTier::High,
                source: SourceTier::Both,
                contributing_chunks: vec![1, 2],
            },
        );

        let text = build_summary(
            &fields,
            &[
                extraction(2, PageRange::new(13, 20), None),
                extraction(1, PageRange::new(1, 12), Some("Safety certificate, first part.")),
            ],
            Some(20),
        );

        assert!(text.contains("Document number: A/25/772 [high confidence, source: both]"));
        assert!(text.contains("Document name: (not found)"));
        let first = text.find("--- Pages 1-12 ---").unwrap();
        let second = text.find("--- Pages 13-20 ---").unwrap();
        assert!(first < second);
        assert!(text.contains("[AI summary unavailable: timed out]"));
        assert!(text.contains("Pages: 20   Chunks analysed: 2"));
    }
}
