//! Structured summaries of uploaded documents
//!
//! The document text is rebuilt from its stored chunks, capped, and sent to
//! the backend chain with a strict-JSON prompt. Output that does not parse
//! still yields a summary, flagged for review.

use crate::chunk::ChunkingConfig;
use crate::generation::prompts::summary_prompt;
use crate::generation::BackendChain;
use crate::store::DocumentStore;
use crate::types::DocumentChunk;
use crate::verification::{strip_code_fences, MAX_VERIFY_CHUNKS};
use orgrag_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Characters of document text sent to the model
pub const MAX_SUMMARY_CHARS: usize = 10_000;

/// Appended when the document text was cut at [`MAX_SUMMARY_CHARS`]
pub const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// Summary used when no backend produced any output
pub const SUMMARY_UNAVAILABLE: &str = "Summary could not be generated for this document.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    WorkReport,
    TechnicalDoc,
    MeetingNotes,
    Proposal,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityAssessment {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Approve,
    NeedsReview,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub summary: String,
    pub key_points: Vec<String>,
    pub document_type: DocumentKind,
    pub quality_assessment: QualityAssessment,
    pub verification_recommendation: Recommendation,
    #[serde(default)]
    pub notes: String,
    /// Model output kept when it could not be parsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_model_output: Option<String>,
}

impl DocumentSummary {
    /// Summary flagged for review: other, medium quality
    fn needs_review(summary: String, raw_model_output: Option<String>) -> Self {
        Self {
            summary,
            key_points: Vec::new(),
            document_type: DocumentKind::Other,
            quality_assessment: QualityAssessment::Medium,
            verification_recommendation: Recommendation::NeedsReview,
            notes: String::new(),
            raw_model_output,
        }
    }
}

pub struct DocumentSummarizer {
    store: Arc<dyn DocumentStore>,
    chain: BackendChain,
    chunking: ChunkingConfig,
}

impl DocumentSummarizer {
    pub fn new(store: Arc<dyn DocumentStore>, chain: BackendChain) -> Self {
        Self {
            store,
            chain,
            chunking: ChunkingConfig::default(),
        }
    }

    /// Chunking the stored windows were cut with, so overlaps can be removed
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    /// Summarize `document_id` from its stored chunks.
    ///
    /// Fails with `NotFound` when the document has no chunks in `org_id`.
    #[instrument(skip(self), fields(org_id = %org_id, document_id = %document_id))]
    pub async fn summarize(&self, org_id: Uuid, document_id: Uuid) -> Result<DocumentSummary> {
        let chunks = self
            .store
            .list_chunks(org_id, document_id, MAX_VERIFY_CHUNKS)
            .await?;
        if chunks.is_empty() {
            return Err(AppError::NotFound {
                resource_type: "document chunks".to_string(),
                id: document_id.to_string(),
            });
        }

        let text = reassemble(&chunks, self.chunking.overlap());
        debug!(chunks = chunks.len(), chars = text.chars().count(), "Document text rebuilt");

        match self.chain.generate(&summary_prompt(&text)).await {
            Ok(generated) => Ok(interpret(&generated.text)),
            Err(e) => {
                warn!(error = %e, "Summary generation failed on every backend");
                Ok(DocumentSummary::needs_review(SUMMARY_UNAVAILABLE.to_string(), None))
            }
        }
    }
}

/// Join chunk windows in index order, dropping each window's overlap with
/// its predecessor, and cap the result at [`MAX_SUMMARY_CHARS`].
fn reassemble(chunks: &[DocumentChunk], overlap: usize) -> String {
    let mut ordered: Vec<&DocumentChunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.chunk_index);

    let mut text = String::new();
    let mut chars = 0;
    for (i, chunk) in ordered.iter().enumerate() {
        let skip = if i == 0 { 0 } else { overlap };
        for c in chunk.content.chars().skip(skip) {
            if chars == MAX_SUMMARY_CHARS {
                text.push_str(TRUNCATION_MARKER);
                return text;
            }
            text.push(c);
            chars += 1;
        }
    }
    text
}

fn interpret(raw: &str) -> DocumentSummary {
    match serde_json::from_str::<DocumentSummary>(strip_code_fences(raw)) {
        Ok(mut parsed) => {
            parsed.summary = parsed.summary.trim().to_string();
            parsed.notes = parsed.notes.trim().to_string();
            parsed.key_points = parsed
                .key_points
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            parsed.raw_model_output = None;
            parsed
        }
        Err(e) => {
            warn!(error = %e, "Summary output unparseable, flagging for review");
            DocumentSummary::needs_review(raw.trim().to_string(), Some(raw.to_string()))
        }
    }
}
