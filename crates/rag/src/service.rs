//! Low-level indexing entry point
//!
//! `RagService` is the loud surface: unknown source types and storage errors
//! come back as errors. Embedding outages do not; the record is stored as
//! unsearchable and the outcome says so. Business code should go through the
//! no-throw [`Indexer`](crate::indexer::Indexer) instead.

use crate::chunk::{chunk_text, ChunkingConfig};
use crate::embed::{embed_capped, DEFAULT_MAX_EMBED_CHARS};
use crate::store::DocumentStore;
use crate::types::{DocumentChunk, IndexedDocument, NewChunk, SourceType};
use orgrag_common::config::RagConfig;
use orgrag_common::embeddings::Embedder;
use orgrag_common::errors::Result;
use orgrag_common::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Upsert request with an unparsed source type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRequest {
    pub org_id: Uuid,
    pub source_type: String,
    pub source_id: Uuid,
    pub content: String,
}

/// What an index call did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOutcome {
    /// Content was empty; nothing was written
    Skipped,
    /// Stored with an embedding
    Searchable,
    /// Stored without an embedding because the embedder was unavailable
    Unsearchable,
}

pub struct RagService {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    max_embed_chars: usize,
    chunking: ChunkingConfig,
}

impl RagService {
    pub fn new(store: Arc<dyn DocumentStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            max_embed_chars: DEFAULT_MAX_EMBED_CHARS,
            chunking: ChunkingConfig::default(),
        }
    }

    pub fn from_config(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        config: &RagConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            max_embed_chars: config.max_embed_chars,
            chunking: ChunkingConfig {
                chunk_size: config.chunk_size,
                chunk_overlap: config.chunk_overlap,
                max_chunks: config.max_chunks,
            },
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn chunking(&self) -> ChunkingConfig {
        self.chunking
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Upsert content for `(org, source_type, source_id)`.
    ///
    /// Empty content is skipped before the source type is checked. Unknown
    /// source types fail with `InvalidDocument`.
    pub async fn index_document(&self, request: IndexRequest) -> Result<IndexOutcome> {
        if request.content.trim().is_empty() {
            return Ok(IndexOutcome::Skipped);
        }
        let source_type: SourceType = request.source_type.parse()?;
        self.index(request.org_id, source_type, request.source_id, request.content)
            .await
    }

    /// Typed variant of [`index_document`](Self::index_document)
    #[instrument(skip(self, content), fields(org_id = %org_id, %source_type, source_id = %source_id))]
    pub async fn index(
        &self,
        org_id: Uuid,
        source_type: SourceType,
        source_id: Uuid,
        content: String,
    ) -> Result<IndexOutcome> {
        if content.trim().is_empty() {
            return Ok(IndexOutcome::Skipped);
        }

        match embed_capped(self.embedder.as_ref(), &content, self.max_embed_chars).await {
            Ok(embedding) => {
                self.store
                    .upsert(IndexedDocument::new(
                        org_id,
                        source_type,
                        source_id,
                        content,
                        Some(embedding),
                    ))
                    .await?;
                debug!("Document indexed");
                Ok(IndexOutcome::Searchable)
            }
            Err(e) if e.is_embedding_unavailable() => {
                warn!(error = %e, "Embedding unavailable, storing record as unsearchable");
                self.store
                    .upsert_unsearchable(org_id, source_type, source_id, content)
                    .await?;
                Ok(IndexOutcome::Unsearchable)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove the record for a raw source type label
    pub async fn delete_document(&self, org_id: Uuid, source_type: &str, source_id: Uuid) -> Result<()> {
        let source_type: SourceType = source_type.parse()?;
        self.delete(org_id, source_type, source_id).await
    }

    pub async fn delete(&self, org_id: Uuid, source_type: SourceType, source_id: Uuid) -> Result<()> {
        self.store.delete_by_source(org_id, source_type, source_id).await
    }

    /// Chunk an uploaded document's text and write every chunk in one batch.
    ///
    /// Embeddings are all-or-nothing: if the batch embedding fails, every
    /// chunk is stored without one and verification ranks them lexically.
    #[instrument(skip(self, text), fields(org_id = %org_id, document_id = %document_id))]
    pub async fn store_document_chunks(
        &self,
        org_id: Uuid,
        document_id: Uuid,
        text: &str,
    ) -> Result<Vec<DocumentChunk>> {
        let pieces = chunk_text(text, &self.chunking);
        if pieces.is_empty() {
            debug!("No extractable text, no chunks stored");
            return Ok(Vec::new());
        }

        let embeddings = self.embed_chunks(&pieces).await;
        let searchable = embeddings.is_some();

        let chunks: Vec<NewChunk> = match embeddings {
            Some(vectors) => pieces
                .into_iter()
                .zip(vectors)
                .map(|(content, embedding)| NewChunk {
                    content,
                    embedding: Some(embedding),
                })
                .collect(),
            None => pieces
                .into_iter()
                .map(|content| NewChunk {
                    content,
                    embedding: None,
                })
                .collect(),
        };

        let created = self.store.create_chunks(org_id, document_id, chunks).await?;
        debug!(chunks = created.len(), searchable, "Document chunks stored");
        Ok(created)
    }

    async fn embed_chunks(&self, pieces: &[String]) -> Option<Vec<Vec<f32>>> {
        let start = Instant::now();
        let result = self.embedder.embed_batch(pieces).await;
        let ok = matches!(&result, Ok(v) if v.len() == pieces.len() && v.iter().all(|e| !e.is_empty()));

        metrics::record_embedding(
            start.elapsed().as_secs_f64(),
            self.embedder.model_name(),
            pieces.len(),
            ok,
        );

        match result {
            Ok(vectors) if ok => Some(vectors),
            Ok(vectors) => {
                warn!(expected = pieces.len(), got = vectors.len(), "Incomplete chunk embeddings, dropping all");
                None
            }
            Err(e) => {
                warn!(error = %e, "Chunk embedding failed, chunks will be ranked lexically");
                None
            }
        }
    }
}
