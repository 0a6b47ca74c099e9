//! AI summary reader
//!
//! The analysis boundary returns free-form summary text. A separate
//! [`FieldExtractor`] turns that text into [`FieldCandidate`]s, either locally
//! ([`SummaryFieldParser`]) or through a reasoning model ([`ModelFieldExtractor`]).

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::boundary::{AnalysisAction, AnalysisPayload, BoundaryError, DocumentAnalyzer};
use crate::types::{CandidateSource, Chunk, ChunkOrigin, DocumentCategory, DocumentField, FieldCandidate};

/// Turns summary text into field candidates
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(&self, summary: &str, origin: ChunkOrigin) -> Vec<FieldCandidate>;
}

/// `Label: value` lines, optionally bulleted or in markdown bold
static LABELLED_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t>*#•-]*([A-Za-z][A-Za-z0-9 ./()'&-]{0,48}?)[ \t]*\**[ \t]*[:：][ \t]*\**[ \t]*(.+?)[ \t]*$")
        .expect("labelled line regex is valid")
});

const LABEL_ALIASES: &[(&str, DocumentField)] = &[
    ("document number", DocumentField::DocumentNumber),
    ("document no", DocumentField::DocumentNumber),
    ("certificate number", DocumentField::DocumentNumber),
    ("certificate no", DocumentField::DocumentNumber),
    ("cert no", DocumentField::DocumentNumber),
    ("report number", DocumentField::DocumentNumber),
    ("report no", DocumentField::DocumentNumber),
    ("passport number", DocumentField::DocumentNumber),
    ("passport no", DocumentField::DocumentNumber),
    ("reference number", DocumentField::DocumentNumber),
    ("reference no", DocumentField::DocumentNumber),
    ("ref no", DocumentField::DocumentNumber),
    ("serial number", DocumentField::DocumentNumber),
    ("report form", DocumentField::ReportForm),
    ("form", DocumentField::ReportForm),
    ("form number", DocumentField::ReportForm),
    ("form no", DocumentField::ReportForm),
    ("document name", DocumentField::DocumentName),
    ("document title", DocumentField::DocumentName),
    ("document type", DocumentField::DocumentName),
    ("certificate name", DocumentField::DocumentName),
    ("certificate title", DocumentField::DocumentName),
    ("certificate type", DocumentField::DocumentName),
    ("report title", DocumentField::DocumentName),
    ("report name", DocumentField::DocumentName),
    ("title", DocumentField::DocumentName),
    ("ship name", DocumentField::ShipName),
    ("vessel name", DocumentField::ShipName),
    ("name of ship", DocumentField::ShipName),
    ("name of vessel", DocumentField::ShipName),
    ("ship", DocumentField::ShipName),
    ("vessel", DocumentField::ShipName),
    ("imo", DocumentField::ImoNumber),
    ("imo number", DocumentField::ImoNumber),
    ("imo no", DocumentField::ImoNumber),
    ("issue date", DocumentField::IssueDate),
    ("date of issue", DocumentField::IssueDate),
    ("date issued", DocumentField::IssueDate),
    ("issued on", DocumentField::IssueDate),
    ("expiry date", DocumentField::ExpiryDate),
    ("expiration date", DocumentField::ExpiryDate),
    ("date of expiry", DocumentField::ExpiryDate),
    ("valid until", DocumentField::ExpiryDate),
    ("expires", DocumentField::ExpiryDate),
    ("issuing authority", DocumentField::IssuingAuthority),
    ("issued by", DocumentField::IssuingAuthority),
    ("issuing body", DocumentField::IssuingAuthority),
    ("classification society", DocumentField::IssuingAuthority),
    ("flag administration", DocumentField::IssuingAuthority),
    ("holder name", DocumentField::HolderName),
    ("holder", DocumentField::HolderName),
    ("name of holder", DocumentField::HolderName),
    ("full name", DocumentField::HolderName),
    ("seafarer name", DocumentField::HolderName),
    ("name of seafarer", DocumentField::HolderName),
];

/// Placeholder answers models give for missing data
const EMPTY_VALUES: &[&str] = &[
    "",
    "-",
    "n/a",
    "na",
    "none",
    "null",
    "unknown",
    "not found",
    "not stated",
    "not specified",
    "not available",
    "not applicable",
];

fn normalize_label(label: &str) -> String {
    label
        .to_lowercase()
        .replace(['.', '(', ')', '#'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn lookup_label(label: &str) -> Option<DocumentField> {
    let label = normalize_label(label);
    LABEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == label)
        .map(|(_, field)| *field)
}

/// Trim decoration and reject placeholders
fn clean_value(raw: &str) -> Option<String> {
    let value = raw
        .trim()
        .trim_matches(|c: char| c == '*' || c == '"' || c == '`' || c == '\'')
        .trim();
    if EMPTY_VALUES.contains(&value.to_lowercase().as_str()) {
        None
    } else {
        Some(value.to_string())
    }
}

fn candidate(field: DocumentField, value: String, origin: ChunkOrigin) -> FieldCandidate {
    FieldCandidate {
        field,
        value,
        source: CandidateSource::AiSummary,
        origin,
    }
}

/// Local labelled-line parser; the first occurrence of each field wins
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryFieldParser;

impl SummaryFieldParser {
    pub fn parse(&self, summary: &str, origin: ChunkOrigin) -> Vec<FieldCandidate> {
        let mut found: Vec<FieldCandidate> = Vec::new();
        for caps in LABELLED_LINE.captures_iter(summary) {
            let Some(field) = lookup_label(&caps[1]) else {
                continue;
            };
            if found.iter().any(|c| c.field == field) {
                continue;
            }
            if let Some(value) = clean_value(&caps[2]) {
                found.push(candidate(field, value, origin));
            }
        }
        found.sort_by_key(|c| c.field);
        found
    }
}

#[async_trait]
impl FieldExtractor for SummaryFieldParser {
    async fn extract(&self, summary: &str, origin: ChunkOrigin) -> Vec<FieldCandidate> {
        self.parse(summary, origin)
    }
}

/// Reasoning-model extractor
///
/// Sends the summary back through the analysis boundary with the `extract_fields`
/// action and expects a JSON object keyed by field name. Any failure falls back to
/// [`SummaryFieldParser`].
pub struct ModelFieldExtractor {
    analyzer: Arc<dyn DocumentAnalyzer>,
    fallback: SummaryFieldParser,
}

impl ModelFieldExtractor {
    pub fn new(analyzer: Arc<dyn DocumentAnalyzer>) -> Self {
        Self {
            analyzer,
            fallback: SummaryFieldParser,
        }
    }
}

/// Parse a model reply, tolerating code fences and prose around the object
pub fn parse_model_reply(
    reply: &str,
    origin: ChunkOrigin,
) -> Result<Vec<FieldCandidate>, String> {
    let start = reply.find('{').ok_or("reply contains no JSON object")?;
    let end = reply.rfind('}').ok_or("reply contains no JSON object")?;
    if end < start {
        return Err("reply contains no JSON object".to_string());
    }

    let object: serde_json::Map<String, Value> =
        serde_json::from_str(&reply[start..=end]).map_err(|e| e.to_string())?;

    let mut candidates: Vec<FieldCandidate> = object
        .iter()
        .filter_map(|(key, value)| {
            let field = DocumentField::from_key(key)?;
            let raw = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            clean_value(&raw).map(|v| candidate(field, v, origin))
        })
        .collect();
    candidates.sort_by_key(|c| c.field);
    Ok(candidates)
}

#[async_trait]
impl FieldExtractor for ModelFieldExtractor {
    async fn extract(&self, summary: &str, origin: ChunkOrigin) -> Vec<FieldCandidate> {
        let payload = AnalysisPayload::text(summary, "summary.txt");
        match self
            .analyzer
            .analyze(AnalysisAction::ExtractFields, &payload)
            .await
        {
            Ok(reply) => match parse_model_reply(&reply, origin) {
                Ok(candidates) if !candidates.is_empty() => candidates,
                Ok(_) => {
                    debug!("Field model returned no fields, parsing summary locally");
                    self.fallback.parse(summary, origin)
                }
                Err(e) => {
                    warn!("Unparseable field model reply ({}), parsing summary locally", e);
                    self.fallback.parse(summary, origin)
                }
            },
            Err(e) => {
                warn!("Field model unavailable ({}), parsing summary locally", e);
                self.fallback.parse(summary, origin)
            }
        }
    }
}

/// Result of the AI path for one chunk
#[derive(Debug, Clone)]
pub struct AiReading {
    pub summary: String,
    pub candidates: Vec<FieldCandidate>,
}

/// Summarise a chunk, then extract fields from the summary
pub struct AiSummaryExtractor {
    analyzer: Arc<dyn DocumentAnalyzer>,
    fields: Arc<dyn FieldExtractor>,
}

impl AiSummaryExtractor {
    pub fn new(analyzer: Arc<dyn DocumentAnalyzer>, fields: Arc<dyn FieldExtractor>) -> Self {
        Self { analyzer, fields }
    }

    pub async fn read(
        &self,
        chunk: &Chunk,
        category: DocumentCategory,
        file_name: &str,
    ) -> Result<AiReading, BoundaryError> {
        let payload = AnalysisPayload::from_chunk(chunk, file_name);
        let summary = self
            .analyzer
            .analyze(AnalysisAction::for_category(category), &payload)
            .await?;

        let candidates = self.fields.extract(&summary, chunk.origin()).await;
        debug!(
            document_id = %chunk.document_id,
            chunk = chunk.index,
            fields = candidates.len(),
            "AI summary read"
        );

        Ok(AiReading {
            summary,
            candidates,
        })
    }
}
