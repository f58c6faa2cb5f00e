//! Document store abstraction
//!
//! The [`DocumentStore`] trait is the only shared mutable resource of the RAG
//! core. Every operation is scoped by organization.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert`](DocumentStore::upsert) | Insert or fully replace a searchable record |
//! | [`upsert_unsearchable`](DocumentStore::upsert_unsearchable) | Store a record without an embedding |
//! | [`delete_by_source`](DocumentStore::delete_by_source) | Idempotent delete |
//! | [`find_similar`](DocumentStore::find_similar) | Unrestricted nearest-neighbour search |
//! | [`find_similar_for_role`](DocumentStore::find_similar_for_role) | Member-restricted search |
//! | [`list_documents`](DocumentStore::list_documents) | List records regardless of searchability |
//! | [`create_chunks`](DocumentStore::create_chunks) | Atomically write a document's chunks |
//! | [`list_chunks`](DocumentStore::list_chunks) | Chunks of one document in ordinal order |

pub mod memory;
pub mod postgres;

pub use memory::InMemoryDocumentStore;
pub use postgres::PgDocumentStore;

use crate::types::{DocumentChunk, IndexedDocument, NewChunk, SimilarityHit, SourceType};
use async_trait::async_trait;
use orgrag_common::errors::{AppError, Result};
use uuid::Uuid;

/// Results returned when the caller passes a limit of 0
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Upper bound on results of one similarity search
pub const MAX_SEARCH_LIMIT: usize = 10;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace the record keyed by `(org_id, source_type, source_id)`.
    /// Fails with `InvalidDocument` when the embedding is missing or empty.
    async fn upsert(&self, doc: IndexedDocument) -> Result<()>;

    /// Insert or replace a record with no embedding. It is listed but never
    /// returned by similarity search.
    async fn upsert_unsearchable(
        &self,
        org_id: Uuid,
        source_type: SourceType,
        source_id: Uuid,
        content: String,
    ) -> Result<()>;

    /// Remove the record if present
    async fn delete_by_source(&self, org_id: Uuid, source_type: SourceType, source_id: Uuid)
        -> Result<()>;

    /// Nearest searchable records of the organization, optionally restricted
    /// to `allowed` source types (empty means all)
    async fn find_similar(
        &self,
        org_id: Uuid,
        query: &[f32],
        allowed: &[SourceType],
        limit: usize,
    ) -> Result<Vec<SimilarityHit>>;

    /// Nearest records among those `user_id` may see as a member
    async fn find_similar_for_role(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        query: &[f32],
        allowed: &[SourceType],
        limit: usize,
    ) -> Result<Vec<SimilarityHit>>;

    /// Most recent records first
    async fn list_documents(&self, org_id: Uuid, limit: usize) -> Result<Vec<IndexedDocument>>;

    /// Write all chunks of a document in one batch. Fails with
    /// `InvalidDocument` if the document already has chunks.
    async fn create_chunks(
        &self,
        org_id: Uuid,
        document_id: Uuid,
        chunks: Vec<NewChunk>,
    ) -> Result<Vec<DocumentChunk>>;

    async fn list_chunks(
        &self,
        org_id: Uuid,
        document_id: Uuid,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>>;
}

/// 0 becomes the default, anything above the maximum is capped
pub fn clamp_search_limit(limit: usize) -> usize {
    match limit {
        0 => DEFAULT_SEARCH_LIMIT,
        n => n.min(MAX_SEARCH_LIMIT),
    }
}

/// Embedding of a record about to be written as searchable
pub(crate) fn require_embedding(doc: &IndexedDocument) -> Result<&[f32]> {
    match doc.embedding.as_deref() {
        Some(embedding) if !embedding.is_empty() => Ok(embedding),
        _ => Err(AppError::InvalidDocument {
            message: format!(
                "{} {} has no embedding; store it as unsearchable instead",
                doc.source_type, doc.source_id
            ),
        }),
    }
}

pub(crate) fn require_query_vector(query: &[f32]) -> Result<()> {
    if query.is_empty() {
        return Err(AppError::Validation {
            message: "Query vector must not be empty".to_string(),
            field: Some("query".to_string()),
        });
    }
    Ok(())
}
