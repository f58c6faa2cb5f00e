//! OrgRAG core
//!
//! Organization-scoped, role-filtered retrieval over tasks, issues, comments
//! and documents:
//! - Indexing: [`Indexer`] (fire-and-forget) over [`RagService`]
//! - Retrieval: [`VectorRetriever`] with member visibility pushed into the store query
//! - Answering: [`GenerationOrchestrator`] over a fallback [`BackendChain`]
//! - Per-document verification and summaries: [`DocumentVerifier`], [`DocumentSummarizer`]
//! - Bulk re-indexing: [`BackfillService`]

pub mod backfill;
pub mod chunk;
pub mod embed;
pub mod generation;
pub mod indexer;
pub mod orchestrator;
pub mod retriever;
pub mod service;
pub mod store;
pub mod summary;
pub mod types;
pub mod verification;
pub mod visibility;

#[cfg(test)]
mod test_support;

pub use backfill::{BackfillReport, BackfillService, WorkItemSource};
pub use generation::BackendChain;
pub use indexer::{IndexJob, IndexJobHandler, Indexer};
pub use orchestrator::{GenerationOrchestrator, QueryRequest, QueryResponse};
pub use retriever::{RetrievalRequest, Retriever, VectorRetriever};
pub use service::{IndexOutcome, IndexRequest, RagService};
pub use store::{DocumentStore, InMemoryDocumentStore, PgDocumentStore};
pub use summary::{DocumentSummarizer, DocumentSummary};
pub use types::{DocumentChunk, IndexedDocument, Role, SimilarityHit, SourceType};
pub use verification::{Citation, DocumentVerifier, Verdict, VerificationResult};
