//! Header/footer pattern reader
//!
//! Renders a chunk's first page, crops the header and footer bands, recognises the
//! band text and applies per-category patterns. Only `report_form` and
//! `document_number` are ever produced; prose fields come from the AI path alone.
//!
//! Rendering shells out to `pdftoppm` and recognition to `tesseract`. Both sit behind
//! traits so tests and other deployments can swap them. Each read holds a permit from
//! a shared semaphore and runs under a deadline; child processes are killed when a
//! read is abandoned.

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, ImageFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::types::{CandidateSource, Chunk, DocumentCategory, DocumentField, FieldCandidate};

#[derive(Debug, Error)]
pub enum PatternReadError {
    #[error("Page render failed: {0}")]
    Render(String),

    #[error("Text recognition failed: {0}")]
    Recognize(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Cannot render {0} payloads")]
    Unsupported(String),

    #[error("No header/footer pattern matched")]
    NoMatch,

    #[error("Header/footer read timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for PatternReadError {
    fn from(err: image::ImageError) -> Self {
        PatternReadError::Image(err.to_string())
    }
}

/// Renders the first page of a chunk payload to a raster image
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render_first_page(
        &self,
        payload: &[u8],
        mime_type: &str,
    ) -> Result<DynamicImage, PatternReadError>;
}

/// Recognises text in a cropped band
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, band: &DynamicImage) -> Result<String, PatternReadError>;
}

/// Poppler `pdftoppm` renderer; images are decoded directly
pub struct PdftoppmRenderer {
    program: String,
    dpi: u32,
}

impl PdftoppmRenderer {
    pub fn new(program: impl Into<String>, dpi: u32) -> Self {
        Self {
            program: program.into(),
            dpi: dpi.max(36),
        }
    }
}

#[async_trait]
impl PageRenderer for PdftoppmRenderer {
    async fn render_first_page(
        &self,
        payload: &[u8],
        mime_type: &str,
    ) -> Result<DynamicImage, PatternReadError> {
        if mime_type.starts_with("image/") {
            return Ok(image::load_from_memory(payload)?);
        }
        if mime_type != "application/pdf" && !payload.starts_with(b"%PDF-") {
            return Err(PatternReadError::Unsupported(mime_type.to_string()));
        }

        let dir = tempfile::tempdir()?;
        let input = dir.path().join("chunk.pdf");
        let prefix = dir.path().join("page");
        tokio::fs::write(&input, payload).await?;

        let output = Command::new(&self.program)
            .arg("-f")
            .arg("1")
            .arg("-l")
            .arg("1")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg("-singlefile")
            .arg(&input)
            .arg(&prefix)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PatternReadError::Render(format!("failed to run '{}': {}", self.program, e))
            })?;

        if !output.status.success() {
            return Err(PatternReadError::Render(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let png = tokio::fs::read(prefix.with_extension("png")).await?;
        Ok(image::load_from_memory(&png)?)
    }
}

/// Tesseract CLI recogniser (`--psm 6`, a single uniform block per band)
pub struct TesseractRecognizer {
    program: String,
}

impl TesseractRecognizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, band: &DynamicImage) -> Result<String, PatternReadError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("band.png");
        band.save_with_format(&path, ImageFormat::Png)?;

        let output = Command::new(&self.program)
            .arg(&path)
            .arg("stdout")
            .arg("--psm")
            .arg("6")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PatternReadError::Recognize(format!("failed to run '{}': {}", self.program, e))
            })?;

        if !output.status.success() {
            return Err(PatternReadError::Recognize(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Crop header (top) and footer (bottom) bands
///
/// Ratios are clamped to `(0, 0.5]` and each band is at least one pixel tall.
pub fn crop_bands(
    page: &DynamicImage,
    header_ratio: f32,
    footer_ratio: f32,
) -> Result<(DynamicImage, DynamicImage), PatternReadError> {
    let (width, height) = page.dimensions();
    if width == 0 || height == 0 {
        return Err(PatternReadError::Image("rendered page is empty".to_string()));
    }

    let band = |ratio: f32| -> u32 {
        let ratio = ratio.clamp(0.0, 0.5);
        ((height as f32 * ratio).round() as u32).clamp(1, height)
    };
    let header_height = band(header_ratio);
    let footer_height = band(footer_ratio);

    let header = page.crop_imm(0, 0, width, header_height);
    let footer = page.crop_imm(0, height - footer_height, width, footer_height);
    Ok((header, footer))
}

// ============================================================================
// Patterns
// ============================================================================

static REPORT_FORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:report\s+)?form\s*(?:no\.?|number|#)?\s*[:.]?\s*([A-Z]{1,4}-?\d{1,4}[A-Z]?)\b")
        .expect("report form regex is valid")
});

static CERTIFICATE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:certificate|cert\.?)\s*(?:no\.?|number|nr\.?|#)\s*[:.]?\s*([A-Z0-9][A-Z0-9/.\-]*\d[A-Z0-9/\-]*)")
        .expect("certificate number regex is valid")
});

static REPORT_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:report|ref(?:erence)?\.?|document|doc\.?)\s*(?:no\.?|number|nr\.?|#)\s*[:.]?\s*([A-Z0-9][A-Z0-9/.\-]*\d[A-Z0-9/\-]*)")
        .expect("report number regex is valid")
});

/// Bare report codes printed in a corner, e.g. `TR-001`
static REPORT_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Z]{2,4}-\d{2,6}(?:-\d{1,4})?)\b").expect("report code regex is valid")
});

static PASSPORT_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bpassport\s*(?:no\.?|number|#)\s*[:.]?\s*([A-Z0-9]{6,12})\b")
        .expect("passport number regex is valid")
});

fn document_number_patterns(category: DocumentCategory) -> Vec<&'static Regex> {
    match category {
        DocumentCategory::Certificate | DocumentCategory::CrewCertificate => {
            vec![&CERTIFICATE_NUMBER, &REPORT_NUMBER]
        }
        DocumentCategory::SurveyReport | DocumentCategory::TestReport | DocumentCategory::Other => {
            vec![&REPORT_NUMBER, &CERTIFICATE_NUMBER, &REPORT_CODE]
        }
        DocumentCategory::Passport => vec![&PASSPORT_NUMBER],
    }
}

fn reads_report_form(category: DocumentCategory) -> bool {
    !matches!(
        category,
        DocumentCategory::Passport | DocumentCategory::CrewCertificate
    )
}

fn first_capture(patterns: &[&Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
    })
}

/// Apply the category's patterns to recognised band text
pub fn match_header_footer(text: &str, category: DocumentCategory) -> Vec<(DocumentField, String)> {
    let mut found = Vec::new();
    if let Some(number) = first_capture(&document_number_patterns(category), text) {
        found.push((DocumentField::DocumentNumber, number));
    }
    if reads_report_form(category) {
        if let Some(form) = first_capture(&[&REPORT_FORM], text) {
            found.push((DocumentField::ReportForm, form.to_uppercase()));
        }
    }
    found
}

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CONCURRENT_READS: usize = 4;

/// Header/footer reader for one chunk
pub struct HeaderFooterReader {
    renderer: Arc<dyn PageRenderer>,
    recognizer: Arc<dyn TextRecognizer>,
    header_ratio: f32,
    footer_ratio: f32,
    /// Render + recognise deadline per chunk, not counting the wait for a permit
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl HeaderFooterReader {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        recognizer: Arc<dyn TextRecognizer>,
        header_ratio: f32,
        footer_ratio: f32,
    ) -> Self {
        Self {
            renderer,
            recognizer,
            header_ratio,
            footer_ratio,
            timeout: DEFAULT_READ_TIMEOUT,
            permits: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_READS)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bound how many chunks render and recognise at once (at least one)
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    async fn band_text(&self, chunk: &Chunk) -> Result<String, PatternReadError> {
        let page = self
            .renderer
            .render_first_page(&chunk.payload, &chunk.mime_type)
            .await?;
        let (header, footer) = crop_bands(&page, self.header_ratio, self.footer_ratio)?;

        let header_text = self.recognizer.recognize(&header).await?;
        let footer_text = self.recognizer.recognize(&footer).await?;
        Ok(format!("{}\n{}", header_text, footer_text))
    }

    pub async fn read(
        &self,
        chunk: &Chunk,
        category: DocumentCategory,
    ) -> Result<Vec<FieldCandidate>, PatternReadError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| PatternReadError::Render(e.to_string()))?;

        let text = match tokio::time::timeout(self.timeout, self.band_text(chunk)).await {
            Ok(text) => text?,
            Err(_) => {
                warn!(
                    document_id = %chunk.document_id,
                    chunk = chunk.index,
                    "Header/footer read exceeded {:?}, abandoned",
                    self.timeout
                );
                return Err(PatternReadError::Timeout(self.timeout));
            }
        };

        let found = match_header_footer(&text, category);
        debug!(
            document_id = %chunk.document_id,
            chunk = chunk.index,
            matched = found.len(),
            "Header/footer bands read"
        );
        if found.is_empty() {
            return Err(PatternReadError::NoMatch);
        }

        let origin = chunk.origin();
        Ok(found
            .into_iter()
            .map(|(field, value)| FieldCandidate {
                field,
                value,
                source: CandidateSource::PatternReader,
                origin,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkOrigin, PageRange};
    use uuid::Uuid;

    fn value(found: &[(DocumentField, String)], field: DocumentField) -> Option<&str> {
        found
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_certificate_header() {
        let text = "LLOYD'S REGISTER   REPORT FORM: A4\n\nCertificate No. A/25/772.   Page 1 of 12";
        let found = match_header_footer(text, DocumentCategory::Certificate);
        assert_eq!(value(&found, DocumentField::DocumentNumber), Some("A/25/772"));
        assert_eq!(value(&found, DocumentField::ReportForm), Some("A4"));
    }

    #[test]
    fn test_bare_test_report_code() {
        let found = match_header_footer("Hydrostatic test   TR-001", DocumentCategory::TestReport);
        assert_eq!(value(&found, DocumentField::DocumentNumber), Some("TR-001"));
        assert_eq!(value(&found, DocumentField::ReportForm), None);
    }

    #[test]
    fn test_labelled_report_number_preferred_over_code() {
        let text = "Form SR-12\nReport No: 2025/HS/0042";
        let found = match_header_footer(text, DocumentCategory::SurveyReport);
        assert_eq!(value(&found, DocumentField::DocumentNumber), Some("2025/HS/0042"));
        assert_eq!(value(&found, DocumentField::ReportForm), Some("SR-12"));
    }

    #[test]
    fn test_passport_reads_number_only() {
        let text = "PASSPORT No. P1234567  Form A1";
        let found = match_header_footer(text, DocumentCategory::Passport);
        assert_eq!(value(&found, DocumentField::DocumentNumber), Some("P1234567"));
        assert_eq!(value(&found, DocumentField::ReportForm), None);
    }

    #[test]
    fn test_prose_is_never_matched() {
        let found = match_header_footer(
            "This certificate is issued under the provisions of the convention",
            DocumentCategory::Certificate,
        );
        assert!(found.is_empty());
    }

    #[test]
    fn test_crop_bands_sizes() {
        let page = DynamicImage::new_rgb8(100, 200);
        let (header, footer) = crop_bands(&page, 0.15, 0.12).unwrap();
        assert_eq!(header.dimensions(), (100, 30));
        assert_eq!(footer.dimensions(), (100, 24));
    }

    #[test]
    fn test_crop_bands_tiny_page() {
        let page = DynamicImage::new_rgb8(10, 2);
        let (header, footer) = crop_bands(&page, 0.15, 0.12).unwrap();
        assert_eq!(header.dimensions(), (10, 1));
        assert_eq!(footer.dimensions(), (10, 1));
    }

    struct BlankRenderer;

    #[async_trait]
    impl PageRenderer for BlankRenderer {
        async fn render_first_page(
            &self,
            _payload: &[u8],
            _mime_type: &str,
        ) -> Result<DynamicImage, PatternReadError> {
            Ok(DynamicImage::new_rgb8(100, 200))
        }
    }

    /// Header band is 30px tall, footer 24px
    struct BandText;

    #[async_trait]
    impl TextRecognizer for BandText {
        async fn recognize(&self, band: &DynamicImage) -> Result<String, PatternReadError> {
            Ok(match band.dimensions().1 {
                30 => "REPORT FORM: A4".to_string(),
                _ => "Certificate No. A/25/772".to_string(),
            })
        }
    }

    fn chunk() -> Chunk {
        Chunk {
            index: 2,
            pages: Some(PageRange::new(13, 24)),
            payload: std::sync::Arc::from(&b"%PDF-1.4"[..]),
            mime_type: "application/pdf".to_string(),
            document_id: Uuid::nil(),
        }
    }

    #[tokio::test]
    async fn test_reader_combines_bands() {
        let reader = HeaderFooterReader::new(Arc::new(BlankRenderer), Arc::new(BandText), 0.15, 0.12);
        let candidates = reader
            .read(&chunk(), DocumentCategory::Certificate)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.source == CandidateSource::PatternReader
            && c.origin == ChunkOrigin::Chunk(2)));
    }

    /// Never finishes rendering
    struct HungRenderer;

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

    #[tokio::test]
    async fn test_hung_renderer_times_out() {
        let reader = HeaderFooterReader::new(Arc::new(HungRenderer), Arc::new(BandText), 0.15, 0.12)
            .with_timeout(Duration::from_millis(50));

        let result = reader.read(&chunk(), DocumentCategory::Certificate).await;
        assert!(matches!(result, Err(PatternReadError::Timeout(_))));
    }

    /// Tracks the most renders in flight at once
    #[derive(Default)]
    struct CountingRenderer {
        in_flight: std::sync::atomic::AtomicUsize,
        peak: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl PageRenderer for CountingRenderer {
        async fn render_first_page(
            &self,
            _payload: &[u8],
            _mime_type: &str,
        ) -> Result<DynamicImage, PatternReadError> {
            use std::sync::atomic::Ordering;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(DynamicImage::new_rgb8(100, 200))
        }
    }

    #[tokio::test]
    async fn test_concurrent_reads_are_bounded() {
        let renderer = Arc::new(CountingRenderer::default());
        let reader = HeaderFooterReader::new(renderer.clone(), Arc::new(BandText), 0.15, 0.12)
            .with_concurrency(2);
        let chunk = chunk();

        let reads = (0..6).map(|_| reader.read(&chunk, DocumentCategory::Certificate));
        let results = futures::future::join_all(reads).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(renderer.peak.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unsupported_payload() {
        let renderer = PdftoppmRenderer::new("pdftoppm", 150);
        let result = renderer.render_first_page(b"hello", "text/plain").await;
        assert!(matches!(result, Err(PatternReadError::Unsupported(_))));
    }
}
