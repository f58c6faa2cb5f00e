//! In-memory [`DocumentStore`] for tests and local runs
//!
//! Records live in a `Vec` in insertion order behind a `tokio::sync::RwLock`.
//! Similarity search is brute-force cosine over every searchable record; ties
//! keep insertion order. Member visibility is evaluated against an ownership
//! registry filled through [`register_task`](InMemoryDocumentStore::register_task),
//! [`register_issue`](InMemoryDocumentStore::register_issue) and
//! [`attach_document`](InMemoryDocumentStore::attach_document).

use super::{clamp_search_limit, require_embedding, require_query_vector, DocumentStore};
use crate::chunk::{cosine_similarity, top_k, ScoredIndex};
use crate::types::{DocumentChunk, IndexedDocument, NewChunk, SimilarityHit, SourceType};
use crate::visibility::{MemberVisibility, OwnedTable, Ownership, OwnershipLookup};
use async_trait::async_trait;
use chrono::Utc;
use orgrag_common::errors::{AppError, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct OwnershipRegistry {
    rows: HashMap<(Uuid, OwnedTable, Uuid), Ownership>,
    attachments: HashMap<(Uuid, Uuid), Uuid>,
}

impl OwnershipLookup for OwnershipRegistry {
    fn ownership(&self, org_id: Uuid, table: OwnedTable, id: Uuid) -> Option<Ownership> {
        self.rows.get(&(org_id, table, id)).copied()
    }

    fn attached_task(&self, org_id: Uuid, document_id: Uuid) -> Option<Uuid> {
        self.attachments.get(&(org_id, document_id)).copied()
    }
}

/// In-memory document store
#[derive(Default)]
pub struct InMemoryDocumentStore {
    docs: RwLock<Vec<IndexedDocument>>,
    chunks: RwLock<Vec<DocumentChunk>>,
    ownership: RwLock<OwnershipRegistry>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record who owns a task
    pub async fn register_task(
        &self,
        org_id: Uuid,
        task_id: Uuid,
        assigned_to: Option<Uuid>,
        created_by: Option<Uuid>,
    ) {
        self.ownership.write().await.rows.insert(
            (org_id, OwnedTable::Tasks, task_id),
            Ownership {
                assignee: assigned_to,
                owner: created_by,
            },
        );
    }

    /// Record who owns an issue
    pub async fn register_issue(
        &self,
        org_id: Uuid,
        issue_id: Uuid,
        assigned_to: Option<Uuid>,
        reported_by: Option<Uuid>,
    ) {
        self.ownership.write().await.rows.insert(
            (org_id, OwnedTable::Issues, issue_id),
            Ownership {
                assignee: assigned_to,
                owner: reported_by,
            },
        );
    }

    /// Record that an uploaded document belongs to a task
    pub async fn attach_document(&self, org_id: Uuid, document_id: Uuid, task_id: Uuid) {
        self.ownership
            .write()
            .await
            .attachments
            .insert((org_id, document_id), task_id);
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    async fn put(&self, doc: IndexedDocument) {
        let mut docs = self.docs.write().await;
        let existing = docs.iter_mut().find(|d| {
            d.org_id == doc.org_id && d.source_type == doc.source_type && d.source_id == doc.source_id
        });

        match existing {
            Some(current) => {
                current.content = doc.content;
                current.embedding = doc.embedding;
            }
            None => docs.push(doc),
        }
    }

    async fn search<F>(
        &self,
        org_id: Uuid,
        query: &[f32],
        allowed: &[SourceType],
        limit: usize,
        visible: F,
    ) -> Result<Vec<SimilarityHit>>
    where
        F: Fn(&IndexedDocument) -> bool,
    {
        require_query_vector(query)?;
        let limit = clamp_search_limit(limit);
        let docs = self.docs.read().await;

        let candidates: Vec<&IndexedDocument> = docs
            .iter()
            .filter(|d| d.org_id == org_id && d.is_searchable())
            .filter(|d| allowed.is_empty() || allowed.contains(&d.source_type))
            .filter(|d| visible(d))
            .collect();

        let scored = candidates
            .iter()
            .enumerate()
            .map(|(index, doc)| ScoredIndex {
                index,
                score: cosine_similarity(query, doc.embedding.as_deref().unwrap_or_default()),
            })
            .collect();

        Ok(top_k(scored, limit)
            .into_iter()
            .map(|s| {
                let doc = candidates[s.index];
                SimilarityHit::new(doc.source_type, doc.source_id, doc.content.clone(), s.score)
            })
            .collect())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn upsert(&self, doc: IndexedDocument) -> Result<()> {
        require_embedding(&doc)?;
        self.put(doc).await;
        Ok(())
    }

    async fn upsert_unsearchable(
        &self,
        org_id: Uuid,
        source_type: SourceType,
        source_id: Uuid,
        content: String,
    ) -> Result<()> {
        self.put(IndexedDocument::new(org_id, source_type, source_id, content, None))
            .await;
        Ok(())
    }

    async fn delete_by_source(
        &self,
        org_id: Uuid,
        source_type: SourceType,
        source_id: Uuid,
    ) -> Result<()> {
        self.docs.write().await.retain(|d| {
            !(d.org_id == org_id && d.source_type == source_type && d.source_id == source_id)
        });
        Ok(())
    }

    async fn find_similar(
        &self,
        org_id: Uuid,
        query: &[f32],
        allowed: &[SourceType],
        limit: usize,
    ) -> Result<Vec<SimilarityHit>> {
        self.search(org_id, query, allowed, limit, |_| true).await
    }

    async fn find_similar_for_role(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        query: &[f32],
        allowed: &[SourceType],
        limit: usize,
    ) -> Result<Vec<SimilarityHit>> {
        let registry = self.ownership.read().await;
        let member = MemberVisibility::new(user_id);

        self.search(org_id, query, allowed, limit, |doc| {
            member.permits(&*registry, org_id, doc.source_type, doc.source_id)
        })
        .await
    }

    async fn list_documents(&self, org_id: Uuid, limit: usize) -> Result<Vec<IndexedDocument>> {
        let docs = self.docs.read().await;
        Ok(docs
            .iter()
            .rev()
            .filter(|d| d.org_id == org_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_chunks(
        &self,
        org_id: Uuid,
        document_id: Uuid,
        chunks: Vec<NewChunk>,
    ) -> Result<Vec<DocumentChunk>> {
        let mut stored = self.chunks.write().await;
        if stored
            .iter()
            .any(|c| c.org_id == org_id && c.document_id == document_id)
        {
            return Err(AppError::InvalidDocument {
                message: format!("chunks for document {} already exist", document_id),
            });
        }

        let now = Utc::now();
        let created: Vec<DocumentChunk> = chunks
            .into_iter()
            .enumerate()
            .map(|(chunk_index, chunk)| DocumentChunk {
                id: Uuid::new_v4(),
                org_id,
                document_id,
                chunk_index,
                content: chunk.content,
                embedding: chunk.embedding,
                created_at: now,
            })
            .collect();

        stored.extend(created.iter().cloned());
        Ok(created)
    }

    async fn list_chunks(
        &self,
        org_id: Uuid,
        document_id: Uuid,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>> {
        let stored = self.chunks.read().await;
        let mut chunks: Vec<DocumentChunk> = stored
            .iter()
            .filter(|c| c.org_id == org_id && c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        chunks.truncate(limit);
        Ok(chunks)
    }
}
