//! Ingest event types and the broadcast EventBus
//!
//! Every pipeline milestone for a document is published as an [`IngestEvent`].
//! The HTTP service forwards them to SSE clients; tests subscribe directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Ingest pipeline events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IngestEvent {
    /// A document was accepted for analysis
    DocumentReceived {
        document_id: Uuid,
        file_name: String,
        category: String,
        timestamp: DateTime<Utc>,
    },

    /// Chunk plan computed
    ChunksPlanned {
        document_id: Uuid,
        page_count: Option<u32>,
        chunk_count: usize,
        chunkable: bool,
    },

    /// One chunk's dual extraction finished (successfully or degraded)
    ChunkExtracted {
        document_id: Uuid,
        chunk_index: u32,
        first_page: u32,
        last_page: u32,
        /// "complete", "ai_only", "pattern_only" or "failed"
        status: String,
    },

    /// Intra- and inter-chunk fusion finished
    FusionCompleted {
        document_id: Uuid,
        field_count: usize,
        manual_entry_required: Vec<String>,
    },

    /// Identity validation finished
    ValidationCompleted {
        document_id: Uuid,
        /// "accept", "accept_with_warning" or "reject"
        classification: String,
    },

    /// Advisory duplicate check finished
    DuplicateChecked {
        document_id: Uuid,
        is_duplicate: bool,
        existing_record_id: Option<String>,
    },

    /// Both artifacts stored
    UploadCompleted {
        document_id: Uuid,
        record_id: String,
        original_file_id: String,
        summary_file_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Record exists but at least one artifact is missing
    UploadPartiallyFailed {
        document_id: Uuid,
        record_id: String,
        message: String,
    },

    /// Caller abandoned a pending document
    DocumentAbandoned { document_id: Uuid },

    /// Pipeline stopped early for a document
    DocumentFailed { document_id: Uuid, message: String },
}

impl IngestEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            IngestEvent::DocumentReceived { .. } => "DocumentReceived",
            IngestEvent::ChunksPlanned { .. } => "ChunksPlanned",
            IngestEvent::ChunkExtracted { .. } => "ChunkExtracted",
            IngestEvent::FusionCompleted { .. } => "FusionCompleted",
            IngestEvent::ValidationCompleted { .. } => "ValidationCompleted",
            IngestEvent::DuplicateChecked { .. } => "DuplicateChecked",
            IngestEvent::UploadCompleted { .. } => "UploadCompleted",
            IngestEvent::UploadPartiallyFailed { .. } => "UploadPartiallyFailed",
            IngestEvent::DocumentAbandoned { .. } => "DocumentAbandoned",
            IngestEvent::DocumentFailed { .. } => "DocumentFailed",
        }
    }

    /// Document the event refers to
    pub fn document_id(&self) -> Uuid {
        match self {
            IngestEvent::DocumentReceived { document_id, .. }
            | IngestEvent::ChunksPlanned { document_id, .. }
            | IngestEvent::ChunkExtracted { document_id, .. }
            | IngestEvent::FusionCompleted { document_id, .. }
            | IngestEvent::ValidationCompleted { document_id, .. }
            | IngestEvent::DuplicateChecked { document_id, .. }
            | IngestEvent::UploadCompleted { document_id, .. }
            | IngestEvent::UploadPartiallyFailed { document_id, .. }
            | IngestEvent::DocumentAbandoned { document_id }
            | IngestEvent::DocumentFailed { document_id, .. } => *document_id,
        }
    }
}

/// Broadcast bus for ingest events
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IngestEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per lagging subscriber
    ///
    /// ```
    /// use shipdocs_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<IngestEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, returning the number of subscribers reached
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: IngestEvent,
    ) -> Result<usize, broadcast::error::SendError<IngestEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the case where nobody is listening
    pub fn emit_lossy(&self, event: IngestEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
