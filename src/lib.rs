//! Cinevault - Telegram bot that archives movies and series
//!
//! Videos are fetched from a URL, uploaded once to a private archive channel
//! and catalogued under collections. Users receive them by short share codes
//! that the bot copies out of the archive.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, retry, rate limiting, workers
//! - `download`: retrieval engine, relay engine and the ingest/deliver flows
//! - `media`: duration, dimensions and thumbnails
//! - `storage`: catalog records and the catalog store
//! - `telegram`: bot setup, command handlers and the archive transport

#![allow(clippy::too_many_arguments)]

pub mod cli;
pub mod context;
pub mod core;
pub mod download;
pub mod media;
pub mod storage;
pub mod telegram;

// Re-export commonly used types for convenience
pub use context::AppContext;
pub use core::config;
pub use download::{PipelineError, QualityTier, Retriever};
pub use storage::{CatalogStore, MemoryCatalog};
