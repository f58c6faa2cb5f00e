//! Role-aware retrieval
//!
//! Embeds the question and dispatches to the similarity search matching the
//! caller's role: admins and managers search the whole organization, members
//! only what the visibility rule lets them see.

use crate::embed::{embed_capped, DEFAULT_MAX_EMBED_CHARS};
use crate::store::DocumentStore;
use crate::types::{Role, SimilarityHit, SourceType};
use async_trait::async_trait;
use orgrag_common::embeddings::Embedder;
use orgrag_common::errors::{AppError, Result};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Results returned when the caller passes a limit of 0
pub const DEFAULT_RETRIEVAL_LIMIT: usize = 5;

/// Upper bound on hits handed to generation
pub const MAX_RETRIEVAL_LIMIT: usize = 5;

/// Retrieval request parameters
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub org_id: Uuid,
    pub user_id: Uuid,
    /// Raw role string; parsed by the retriever
    pub role: String,
    pub query: String,
    pub limit: usize,
    /// Empty means every source type
    pub allowed: Vec<SourceType>,
}

impl RetrievalRequest {
    pub fn new(org_id: Uuid, user_id: Uuid, role: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            org_id,
            user_id,
            role: role.into(),
            query: query.into(),
            limit: DEFAULT_RETRIEVAL_LIMIT,
            allowed: Vec::new(),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_source_types(mut self, allowed: Vec<SourceType>) -> Self {
        self.allowed = allowed;
        self
    }
}

/// Common trait for retrievers
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Ranked hits, most similar first.
    ///
    /// Fails with `EmptyQuery`, `UnknownRole` or `EmbeddingUnavailable`.
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<SimilarityHit>>;
}

/// 0 becomes the default, anything above the maximum is capped
pub fn clamp_retrieval_limit(limit: usize) -> usize {
    match limit {
        0 => DEFAULT_RETRIEVAL_LIMIT,
        n => n.min(MAX_RETRIEVAL_LIMIT),
    }
}

/// Retriever over a [`DocumentStore`] using query embeddings
pub struct VectorRetriever {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    max_embed_chars: usize,
}

impl VectorRetriever {
    pub fn new(store: Arc<dyn DocumentStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            max_embed_chars: DEFAULT_MAX_EMBED_CHARS,
        }
    }

    pub fn with_max_embed_chars(mut self, max_embed_chars: usize) -> Self {
        self.max_embed_chars = max_embed_chars;
        self
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    #[instrument(skip(self, request), fields(org_id = %request.org_id, role = %request.role))]
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<SimilarityHit>> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(AppError::EmptyQuery);
        }
        let role: Role = request.role.parse()?;
        let limit = clamp_retrieval_limit(request.limit);

        let vector = embed_capped(self.embedder.as_ref(), query, self.max_embed_chars)
            .await
            .map_err(|e| match e {
                AppError::EmbeddingUnavailable { .. } => e,
                other => AppError::EmbeddingUnavailable {
                    message: other.to_string(),
                },
            })?;

        let hits = if role.is_privileged() {
            self.store
                .find_similar(request.org_id, &vector, &request.allowed, limit)
                .await?
        } else {
            self.store
                .find_similar_for_role(
                    request.org_id,
                    request.user_id,
                    &vector,
                    &request.allowed,
                    limit,
                )
                .await?
        };

        debug!(hits = hits.len(), limit, "Retrieval complete");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDocumentStore;
    use crate::test_support::FailingEmbedder;
    use crate::types::IndexedDocument;
    use orgrag_common::embeddings::HashingEmbedder;

    async fn seeded() -> (Arc<InMemoryDocumentStore>, Arc<dyn Embedder>, Uuid) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(256));
        let org = Uuid::new_v4();

        for i in 0..8 {
            let content = format!("Comment: deployment note number {i}");
            let embedding = embedder.embed(&content).await.unwrap();
            store
                .upsert(IndexedDocument::new(org, SourceType::Comment, Uuid::new_v4(), content, Some(embedding)))
                .await
                .unwrap();
        }
        let task = "Task: Fix deployment pipeline\n\nThe deployment fails on staging";
        let task_id = Uuid::new_v4();
        store.register_task(org, task_id, Some(Uuid::new_v4()), None).await;
        store
            .upsert(IndexedDocument::new(
                org,
                SourceType::Task,
                task_id,
                task,
                Some(embedder.embed(task).await.unwrap()),
            ))
            .await
            .unwrap();

        (store, embedder, org)
    }

    #[test]
    fn test_clamp_retrieval_limit() {
        assert_eq!(clamp_retrieval_limit(0), 5);
        assert_eq!(clamp_retrieval_limit(3), 3);
        assert_eq!(clamp_retrieval_limit(9), 5);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let (store, embedder, org) = seeded().await;
        let retriever = VectorRetriever::new(store, embedder);
        let request = RetrievalRequest::new(org, Uuid::new_v4(), "admin", "   ");

        assert!(matches!(
            retriever.retrieve(&request).await,
            Err(AppError::EmptyQuery)
        ));
    }

    #[tokio::test]
    async fn test_unknown_role_rejected() {
        let (store, embedder, org) = seeded().await;
        let retriever = VectorRetriever::new(store, embedder);
        let request = RetrievalRequest::new(org, Uuid::new_v4(), "owner", "deployment");

        assert!(matches!(
            retriever.retrieve(&request).await,
            Err(AppError::UnknownRole { .. })
        ));
    }

    #[tokio::test]
    async fn test_limit_capped_at_five() {
        let (store, embedder, org) = seeded().await;
        let retriever = VectorRetriever::new(store, embedder);
        let request =
            RetrievalRequest::new(org, Uuid::new_v4(), "manager", "deployment").with_limit(10);

        assert_eq!(retriever.retrieve(&request).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_member_does_not_see_foreign_task() {
        let (store, embedder, org) = seeded().await;
        let retriever = VectorRetriever::new(store, embedder);

        let admin = RetrievalRequest::new(org, Uuid::new_v4(), "admin", "deployment pipeline staging")
            .with_source_types(vec![SourceType::Task]);
        let hits = retriever.retrieve(&admin).await.unwrap();
        assert_eq!(hits.len(), 1);

        let member = RetrievalRequest::new(org, Uuid::new_v4(), "member", "deployment pipeline staging");
        let hits = retriever.retrieve(&member).await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.source_type == SourceType::Comment));
    }

    #[tokio::test]
    async fn test_embedding_failure_surfaces() {
        let (store, _, org) = seeded().await;
        let retriever = VectorRetriever::new(store, Arc::new(FailingEmbedder));
        let request = RetrievalRequest::new(org, Uuid::new_v4(), "admin", "deployment");

        assert!(matches!(
            retriever.retrieve(&request).await,
            Err(AppError::EmbeddingUnavailable { .. })
        ));
    }
}
