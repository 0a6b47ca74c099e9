//! shipdocs-ingest library interface
//!
//! Document ingestion for the fleet record store: chunking, dual extraction, fusion,
//! identity validation, advisory duplicate detection and two-phase upload. The
//! binary wraps it in an axum service; tests drive it directly with fake boundaries.

pub mod api;
pub mod boundary;
pub mod chunking;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod fusion;
pub mod types;
pub mod validators;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult, IngestError};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use shipdocs_common::events::EventBus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::boundary::{ArtifactStore, DocumentAnalyzer};
use crate::chunking::ChunkPlanner;
use crate::config::IngestConfig;
use crate::extractors::{
    AiSummaryExtractor, DualExtractor, FieldExtractor, HeaderFooterReader, ModelFieldExtractor,
    PdftoppmRenderer, SummaryFieldParser, TesseractRecognizer,
};
use crate::validators::RecordLookup;
use crate::workflow::{PendingRegistry, Pipeline, UploadOrchestrator};

/// Base64 inflates uploads by a third; multi-hundred-page scans are common
const MAX_REQUEST_BODY_BYTES: usize = 256 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub orchestrator: Arc<UploadOrchestrator>,
    /// Documents between Phase 1 and the end of Phase 2
    pub pending: PendingRegistry,
    pub lookup: Arc<dyn RecordLookup>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub config: Arc<IngestConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        config: IngestConfig,
        pipeline: Pipeline,
        store: Arc<dyn ArtifactStore>,
        lookup: Arc<dyn RecordLookup>,
    ) -> Self {
        let event_bus = pipeline.events().clone();
        let pending = PendingRegistry::new();
        let orchestrator = UploadOrchestrator::new(store, pending.clone(), event_bus.clone());

        Self {
            pipeline: Arc::new(pipeline),
            orchestrator: Arc::new(orchestrator),
            pending,
            lookup,
            event_bus,
            config: Arc::new(config),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Remember the latest failure for /health
    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Assemble the Phase 1 pipeline from configuration and an analysis boundary
///
/// Field extraction runs on the configured field model when one is set, otherwise
/// fields are parsed locally from the summary text. The pattern reader is skipped
/// entirely when disabled, producing AI-only chunks.
pub fn build_pipeline(
    config: &IngestConfig,
    analyzer: Arc<dyn DocumentAnalyzer>,
    event_bus: EventBus,
) -> Pipeline {
    let fields: Arc<dyn FieldExtractor> = if config.analysis.field_model_id.is_some() {
        Arc::new(ModelFieldExtractor::new(Arc::clone(&analyzer)))
    } else {
        Arc::new(SummaryFieldParser)
    };
    let ai = AiSummaryExtractor::new(analyzer, fields);

    let settings = &config.pipeline;
    let pattern = settings.pattern_reader_enabled.then(|| {
        HeaderFooterReader::new(
            Arc::new(PdftoppmRenderer::new(
                settings.pdftoppm_path.clone(),
                settings.render_dpi,
            )),
            Arc::new(TesseractRecognizer::new(settings.tesseract_path.clone())),
            settings.header_band_ratio,
            settings.footer_band_ratio,
        )
        .with_timeout(Duration::from_secs(settings.pattern_timeout_secs))
        .with_concurrency(settings.pattern_concurrency)
    });

    Pipeline::new(
        ChunkPlanner::new(settings.chunk_page_window),
        DualExtractor::new(ai, pattern),
        event_bus,
    )
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::document_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
