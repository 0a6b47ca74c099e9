//! # shipdocs common library
//!
//! Shared code for the shipdocs services:
//! - Error type used across crates
//! - Bootstrap configuration (TOML) and root folder resolution
//! - Ingest event types and the broadcast EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
