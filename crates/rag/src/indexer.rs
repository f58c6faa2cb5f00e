//! Fire-and-forget indexing façade
//!
//! Business domains call [`Indexer`] whenever a task, issue, comment or
//! document changes. Every call builds the canonical content string, enqueues
//! an [`IndexJob`] and returns immediately; nothing here returns an error. When
//! the RAG feature is disabled the façade is constructed empty and every call
//! is a no-op.

use crate::service::{IndexOutcome, RagService};
use crate::types::SourceType;
use async_trait::async_trait;
use orgrag_common::errors::Result;
use orgrag_common::queue::{Job, JobHandler, QueueConfig, WorkQueue};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// `Task: {title}\n\n{description}`
pub fn task_content(title: &str, description: &str) -> String {
    format!("Task: {}\n\n{}", title, description)
}

/// `Issue: {title}\n\n{description}`
pub fn issue_content(title: &str, description: &str) -> String {
    format!("Issue: {}\n\n{}", title, description)
}

pub fn comment_content(body: &str) -> String {
    format!("Comment: {}", body)
}

pub fn document_content(title: &str, content: &str) -> String {
    format!("Document: {}\n\n{}", title, content)
}

pub fn task_document_content(filename: &str, content: &str) -> String {
    format!("Task Document: {}\nContent: {}", filename, content)
}

fn is_blank(parts: &[&str]) -> bool {
    parts.iter().all(|p| p.trim().is_empty())
}

/// Background index operation
#[derive(Clone)]
pub enum IndexJob {
    Upsert {
        org_id: Uuid,
        source_type: SourceType,
        source_id: Uuid,
        content: String,
    },
    Delete {
        org_id: Uuid,
        source_type: SourceType,
        source_id: Uuid,
    },
    /// Chunk an uploaded document's extracted text for verification
    Chunks {
        org_id: Uuid,
        document_id: Uuid,
        text: String,
    },
}

// Content is summarized so dropped or failed jobs do not dump documents into logs
impl fmt::Debug for IndexJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexJob::Upsert {
                org_id,
                source_type,
                source_id,
                content,
            } => f
                .debug_struct("Upsert")
                .field("org_id", org_id)
                .field("source_type", source_type)
                .field("source_id", source_id)
                .field("content_chars", &content.chars().count())
                .finish(),
            IndexJob::Delete {
                org_id,
                source_type,
                source_id,
            } => f
                .debug_struct("Delete")
                .field("org_id", org_id)
                .field("source_type", source_type)
                .field("source_id", source_id)
                .finish(),
            IndexJob::Chunks {
                org_id,
                document_id,
                text,
            } => f
                .debug_struct("Chunks")
                .field("org_id", org_id)
                .field("document_id", document_id)
                .field("text_chars", &text.chars().count())
                .finish(),
        }
    }
}

impl Job for IndexJob {
    fn operation(&self) -> &'static str {
        match self {
            IndexJob::Upsert { .. } => "upsert",
            IndexJob::Delete { .. } => "delete",
            IndexJob::Chunks { .. } => "chunks",
        }
    }
}

/// Runs index jobs against the low-level service
pub struct IndexJobHandler {
    service: Arc<RagService>,
}

impl IndexJobHandler {
    pub fn new(service: Arc<RagService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobHandler<IndexJob> for IndexJobHandler {
    async fn handle(&self, job: IndexJob) -> Result<()> {
        match job {
            IndexJob::Upsert {
                org_id,
                source_type,
                source_id,
                content,
            } => {
                let outcome = self
                    .service
                    .index(org_id, source_type, source_id, content)
                    .await?;
                if outcome == IndexOutcome::Unsearchable {
                    warn!(org_id = %org_id, %source_type, source_id = %source_id, "Indexed without embedding");
                }
                Ok(())
            }
            IndexJob::Delete {
                org_id,
                source_type,
                source_id,
            } => self.service.delete(org_id, source_type, source_id).await,
            IndexJob::Chunks {
                org_id,
                document_id,
                text,
            } => {
                self.service
                    .store_document_chunks(org_id, document_id, &text)
                    .await?;
                Ok(())
            }
        }
    }
}

/// No-throw indexing surface for business code
#[derive(Clone, Default)]
pub struct Indexer {
    queue: Option<WorkQueue<IndexJob>>,
}

impl Indexer {
    /// Indexer whose every call is a no-op
    pub fn disabled() -> Self {
        Self { queue: None }
    }

    pub fn new(queue: WorkQueue<IndexJob>) -> Self {
        Self { queue: Some(queue) }
    }

    /// Start the background worker and return the façade plus the worker handle.
    /// The worker drains and stops once every clone of the indexer is dropped.
    pub fn start(service: Arc<RagService>, config: QueueConfig) -> (Self, JoinHandle<()>) {
        let (queue, worker) = WorkQueue::start(config, Arc::new(IndexJobHandler::new(service)));
        (Self::new(queue), worker)
    }

    pub fn is_enabled(&self) -> bool {
        self.queue.is_some()
    }

    fn enqueue(&self, job: IndexJob) {
        let Some(queue) = &self.queue else {
            return;
        };
        debug!(job = ?job, "Index job enqueued");
        queue.submit(job);
    }

    fn upsert(&self, org_id: Uuid, source_type: SourceType, source_id: Uuid, content: String) {
        self.enqueue(IndexJob::Upsert {
            org_id,
            source_type,
            source_id,
            content,
        });
    }

    fn delete(&self, org_id: Uuid, source_type: SourceType, source_id: Uuid) {
        self.enqueue(IndexJob::Delete {
            org_id,
            source_type,
            source_id,
        });
    }

    /// Upsert raw content under any source type; blank content is ignored
    pub fn index_raw(&self, org_id: Uuid, source_type: SourceType, source_id: Uuid, content: String) {
        if is_blank(&[&content]) {
            return;
        }
        self.upsert(org_id, source_type, source_id, content);
    }

    pub fn index_task(&self, org_id: Uuid, task_id: Uuid, title: &str, description: &str) {
        if is_blank(&[title, description]) {
            return;
        }
        self.upsert(org_id, SourceType::Task, task_id, task_content(title, description));
    }

    pub fn index_issue(&self, org_id: Uuid, issue_id: Uuid, title: &str, description: &str) {
        if is_blank(&[title, description]) {
            return;
        }
        self.upsert(org_id, SourceType::Issue, issue_id, issue_content(title, description));
    }

    pub fn index_comment(&self, org_id: Uuid, comment_id: Uuid, body: &str) {
        if is_blank(&[body]) {
            return;
        }
        self.upsert(org_id, SourceType::Comment, comment_id, comment_content(body));
    }

    pub fn index_document(&self, org_id: Uuid, document_id: Uuid, title: &str, content: &str) {
        if is_blank(&[content]) {
            return;
        }
        self.upsert(
            org_id,
            SourceType::Document,
            document_id,
            document_content(title, content),
        );
    }

    /// Keyed by the owning task, so a task holds at most one indexed attachment text
    pub fn index_task_document(&self, org_id: Uuid, task_id: Uuid, filename: &str, content: &str) {
        if is_blank(&[content]) {
            return;
        }
        self.upsert(
            org_id,
            SourceType::TaskDocument,
            task_id,
            task_document_content(filename, content),
        );
    }

    /// Store verification chunks for an uploaded document. A document is
    /// chunked once; a second submission fails in the worker and is logged.
    pub fn index_document_chunks(&self, org_id: Uuid, document_id: Uuid, text: &str) {
        if is_blank(&[text]) {
            return;
        }
        self.enqueue(IndexJob::Chunks {
            org_id,
            document_id,
            text: text.to_string(),
        });
    }

    pub fn delete_source(&self, org_id: Uuid, source_type: SourceType, source_id: Uuid) {
        self.delete(org_id, source_type, source_id);
    }

    pub fn delete_task(&self, org_id: Uuid, task_id: Uuid) {
        self.delete(org_id, SourceType::Task, task_id);
    }

    pub fn delete_issue(&self, org_id: Uuid, issue_id: Uuid) {
        self.delete(org_id, SourceType::Issue, issue_id);
    }

    pub fn delete_comment(&self, org_id: Uuid, comment_id: Uuid) {
        self.delete(org_id, SourceType::Comment, comment_id);
    }

    pub fn delete_document(&self, org_id: Uuid, document_id: Uuid) {
        self.delete(org_id, SourceType::Document, document_id);
    }

    pub fn delete_task_document(&self, org_id: Uuid, task_id: Uuid) {
        self.delete(org_id, SourceType::TaskDocument, task_id);
    }
}
