//! # transq-core
//!
//! Core types, traits, and abstractions for the transq translation job queue.
//!
//! This crate provides the data model shared by the scheduler and runner,
//! the deployment configuration, the error taxonomy, the boundary-aware text
//! chunker, and the [`TranslationClient`] trait that backends implement.

pub mod chunking;
pub mod config;
pub mod defaults;
pub mod error;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use chunking::{join_translated, split, BoundaryChunker, Chunker, TextSpan};
pub use config::QueueConfig;
pub use error::{Error, Result};
pub use models::*;
pub use traits::TranslationClient;
