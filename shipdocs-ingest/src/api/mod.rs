//! HTTP API handlers for shipdocs-ingest
//!
//! REST for the two pipeline phases plus SSE for progress events.

pub mod documents;
pub mod health;
pub mod sse;

pub use documents::document_routes;
pub use health::health_routes;
pub use sse::event_stream;
