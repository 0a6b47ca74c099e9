//! Dual extractor: both readers over one chunk, concurrently
//!
//! Neither path blocks the other. A failure on one side degrades the chunk to the
//! other side's reading; only a failure on both marks the chunk `Failed`, which
//! excludes it from voting.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ai_summary::AiSummaryExtractor;
use super::pattern_reader::HeaderFooterReader;
use crate::error::IngestError;
use crate::types::{Chunk, DocumentCategory, FieldCandidate, PageRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Complete,
    AiOnly,
    PatternOnly,
    Failed,
}

impl ExtractionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::AiOnly => "ai_only",
            Self::PatternOnly => "pattern_only",
            Self::Failed => "failed",
        }
    }

    fn from_outcomes(ai_ok: bool, pattern_ok: bool) -> Self {
        match (ai_ok, pattern_ok) {
            (true, true) => Self::Complete,
            (true, false) => Self::AiOnly,
            (false, true) => Self::PatternOnly,
            (false, false) => Self::Failed,
        }
    }
}

/// Both readings of one chunk
#[derive(Debug, Clone)]
pub struct ChunkExtraction {
    pub chunk_index: u32,
    pub pages: Option<PageRange>,
    /// Raw AI summary, kept for the merged audit summary
    pub summary: Option<String>,
    pub ai_candidates: Vec<FieldCandidate>,
    pub pattern_candidates: Vec<FieldCandidate>,
    pub status: ExtractionStatus,
    pub ai_error: Option<String>,
    pub pattern_error: Option<String>,
}

impl ChunkExtraction {
    pub fn is_failed(&self) -> bool {
        self.status == ExtractionStatus::Failed
    }

    pub fn label(&self) -> String {
        match self.pages {
            Some(range) => range.to_string(),
            None => "Whole document".to_string(),
        }
    }
}

pub struct DualExtractor {
    ai: AiSummaryExtractor,
    /// `None` when the pattern reader is disabled
    pattern: Option<HeaderFooterReader>,
}

impl DualExtractor {
    pub fn new(ai: AiSummaryExtractor, pattern: Option<HeaderFooterReader>) -> Self {
        Self { ai, pattern }
    }

    pub async fn extract(
        &self,
        chunk: &Chunk,
        category: DocumentCategory,
        file_name: &str,
    ) -> ChunkExtraction {
        let ai_read = self.ai.read(chunk, category, file_name);
        let pattern_read = async {
            match &self.pattern {
                Some(reader) => Some(reader.read(chunk, category).await.map_err(|e| {
                    IngestError::PatternReadFailure(e.to_string()).to_string()
                })),
                None => None,
            }
        };

        let (ai_result, pattern_result) = tokio::join!(ai_read, pattern_read);

        let (summary, ai_candidates, ai_error) = match ai_result {
            Ok(reading) => (Some(reading.summary), reading.candidates, None),
            Err(e) => {
                warn!(
                    document_id = %chunk.document_id,
                    chunk = chunk.index,
                    "AI summary failed: {}",
                    e
                );
                let labelled = IngestError::AnalysisUnavailable(e.to_string());
                (None, Vec::new(), Some(labelled.to_string()))
            }
        };

        // A disabled reader contributes nothing but is not an error
        let pattern_ok = matches!(pattern_result, Some(Ok(_)));
        let (pattern_candidates, pattern_error) = match pattern_result {
            Some(Ok(candidates)) => (candidates, None),
            None => (Vec::new(), None),
            Some(Err(e)) => {
                debug!(
                    document_id = %chunk.document_id,
                    chunk = chunk.index,
                    "Pattern reader produced nothing: {}",
                    e
                );
                (Vec::new(), Some(e))
            }
        };

        let status = ExtractionStatus::from_outcomes(ai_error.is_none(), pattern_ok);
        if status == ExtractionStatus::Failed {
            warn!(
                document_id = %chunk.document_id,
                chunk = chunk.index,
                "Both readers failed, chunk excluded from voting"
            );
        }

        ChunkExtraction {
            chunk_index: chunk.index,
            pages: chunk.pages,
            summary,
            ai_candidates,
            pattern_candidates,
            status,
            ai_error,
            pattern_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_outcomes() {
        assert_eq!(ExtractionStatus::from_outcomes(true, true), ExtractionStatus::Complete);
        assert_eq!(ExtractionStatus::from_outcomes(true, false), ExtractionStatus::AiOnly);
        assert_eq!(ExtractionStatus::from_outcomes(false, true), ExtractionStatus::PatternOnly);
        assert_eq!(ExtractionStatus::from_outcomes(false, false), ExtractionStatus::Failed);
        assert_eq!(ExtractionStatus::PatternOnly.as_str(), "pattern_only");
    }
}
