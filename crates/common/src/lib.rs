//! OrgRAG Common Library
//!
//! Shared code for the OrgRAG services including:
//! - Configuration management
//! - Error types and handling
//! - Database pool, entity models and business-table reads
//! - Embedding client abstraction
//! - Background work queue
//! - Request identity extraction
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod metrics;
pub mod queue;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
