//! Document-level verification
//!
//! Answers a question about one uploaded document from its own chunks. Chunks
//! are ranked by cosine similarity when both the question and the chunk have
//! embeddings, lexically otherwise. The model must reply with a JSON verdict;
//! anything unparseable degrades to an `insufficient` result carrying the raw
//! text instead of an error.

use crate::chunk::{cosine_similarity, keyword_score, top_k, ScoredIndex, DEFAULT_TOP_K};
use crate::embed::{embed_capped, DEFAULT_MAX_EMBED_CHARS};
use crate::generation::prompts::{verification_prompt, INSUFFICIENT_DATA};
use crate::generation::BackendChain;
use crate::store::DocumentStore;
use crate::types::DocumentChunk;
use orgrag_common::embeddings::Embedder;
use orgrag_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Chunks considered per document
pub const MAX_VERIFY_CHUNKS: usize = 1000;

/// Characters of chunk text kept in a citation
pub const SNIPPET_CHARS: usize = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Verified,
    Unverified,
    Insufficient,
}

impl std::str::FromStr for Verdict {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "verified" => Ok(Verdict::Verified),
            "unverified" => Ok(Verdict::Unverified),
            "insufficient" => Ok(Verdict::Insufficient),
            other => Err(AppError::ParseFailure {
                message: format!("unknown verdict '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_index: usize,
    pub snippet: String,
    /// Why the model cited this chunk, when it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verdict: Verdict,
    /// In `[0, 1]`
    pub confidence: f64,
    pub answer: String,
    /// One entry per retrieved chunk, in ranking order
    pub citations: Vec<Citation>,
    /// Model output kept when it could not be parsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_model_output: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelVerdict {
    verdict: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    citations: Vec<ModelCitation>,
}

#[derive(Debug, Deserialize)]
struct ModelCitation {
    chunk_index: i64,
    #[serde(default)]
    reason: String,
}

pub struct DocumentVerifier {
    store: Arc<dyn DocumentStore>,
    embedder: Option<Arc<dyn Embedder>>,
    chain: BackendChain,
    top_k: usize,
    max_embed_chars: usize,
}

impl DocumentVerifier {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Option<Arc<dyn Embedder>>,
        chain: BackendChain,
    ) -> Self {
        Self {
            store,
            embedder,
            chain,
            top_k: DEFAULT_TOP_K,
            max_embed_chars: DEFAULT_MAX_EMBED_CHARS,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_max_embed_chars(mut self, max_embed_chars: usize) -> Self {
        self.max_embed_chars = max_embed_chars;
        self
    }

    /// Answer `question` from the chunks of `document_id`.
    ///
    /// Fails with `EmptyQuery` for a blank question and `NotFound` when the
    /// document has no stored chunks; everything else degrades.
    #[instrument(skip(self, question), fields(org_id = %org_id, document_id = %document_id))]
    pub async fn verify(
        &self,
        org_id: Uuid,
        document_id: Uuid,
        question: &str,
    ) -> Result<VerificationResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::EmptyQuery);
        }

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

        let query_vector = self.embed_question(question).await;
        let selected = rank_chunks(question, query_vector.as_deref(), &chunks, self.top_k);
        let selected: Vec<&DocumentChunk> = selected.iter().map(|s| &chunks[s.index]).collect();

        let excerpts = selected
            .iter()
            .map(|c| format!("[Chunk {}]\n{}", c.chunk_index, c.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let citations: Vec<Citation> = selected
            .iter()
            .map(|c| Citation {
                chunk_index: c.chunk_index,
                snippet: c.content.chars().take(SNIPPET_CHARS).collect(),
                reason: None,
            })
            .collect();

        debug!(chunks = chunks.len(), selected = selected.len(), lexical = query_vector.is_none(), "Chunks ranked");

        let raw = match self.chain.generate(&verification_prompt(question, &excerpts)).await {
            Ok(generated) => generated.text,
            Err(e) => {
                warn!(error = %e, "Verification generation failed on every backend");
                return Ok(VerificationResult {
                    verdict: Verdict::Insufficient,
                    confidence: 0.0,
                    answer: INSUFFICIENT_DATA.to_string(),
                    citations,
                    raw_model_output: None,
                });
            }
        };

        Ok(interpret(&raw, citations))
    }

    async fn embed_question(&self, question: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embed_capped(embedder.as_ref(), question, self.max_embed_chars).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(error = %e, "Question embedding failed, ranking chunks lexically");
                None
            }
        }
    }
}

/// Score every chunk and keep the best `k`.
///
/// Cosine when both vectors exist, keyword overlap otherwise.
fn rank_chunks(
    question: &str,
    query_vector: Option<&[f32]>,
    chunks: &[DocumentChunk],
    k: usize,
) -> Vec<ScoredIndex> {
    let scored = chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| {
            let score = match (query_vector, chunk.embedding.as_deref()) {
                (Some(q), Some(e)) if !e.is_empty() => cosine_similarity(q, e),
                _ => keyword_score(question, &chunk.content),
            };
            ScoredIndex { index, score }
        })
        .collect();
    top_k(scored, k)
}

/// Strip surrounding Markdown code fences, if any
pub(crate) fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop an optional language tag on the opening fence
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn parse_model_output(raw: &str) -> Result<(Verdict, ModelVerdict)> {
    let parsed: ModelVerdict = serde_json::from_str(strip_code_fences(raw)).map_err(|e| {
        AppError::ParseFailure {
            message: e.to_string(),
        }
    })?;
    let verdict = parsed.verdict.parse::<Verdict>()?;
    Ok((verdict, parsed))
}

fn interpret(raw: &str, mut citations: Vec<Citation>) -> VerificationResult {
    match parse_model_output(raw) {
        Ok((verdict, parsed)) => {
            // Citations of chunks that were not retrieved are dropped
            for cited in parsed.citations {
                let reason = cited.reason.trim();
                if reason.is_empty() {
                    continue;
                }
                if let Some(c) = citations
                    .iter_mut()
                    .find(|c| i64::try_from(c.chunk_index).is_ok_and(|i| i == cited.chunk_index))
                {
                    c.reason = Some(reason.to_string());
                }
            }

            let confidence = if parsed.confidence.is_nan() {
                0.0
            } else {
                parsed.confidence.clamp(0.0, 1.0)
            };

            VerificationResult {
                verdict,
                confidence,
                answer: parsed.answer.trim().to_string(),
                citations,
                raw_model_output: None,
            }
        }
        Err(e) => {
            warn!(error = %e, "Verification output unparseable, degrading to insufficient");
            VerificationResult {
                verdict: Verdict::Insufficient,
                confidence: 0.0,
                answer: raw.trim().to_string(),
                citations,
                raw_model_output: Some(raw.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationBackend;
    use crate::store::InMemoryDocumentStore;
    use crate::test_support::{FailingEmbedder, ScriptedBackend};
    use crate::types::NewChunk;
    use orgrag_common::embeddings::HashingEmbedder;

    fn citations(indexes: &[usize]) -> Vec<Citation> {
        indexes
            .iter()
            .map(|&chunk_index| Citation {
                chunk_index,
                snippet: format!("chunk {chunk_index}"),
                reason: None,
            })
            .collect()
    }

    async fn seeded_store(texts: &[&str]) -> (Arc<InMemoryDocumentStore>, Uuid, Uuid) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let (org, doc) = (Uuid::new_v4(), Uuid::new_v4());
        let chunks = texts
            .iter()
            .map(|t| NewChunk {
                content: t.to_string(),
                embedding: None,
            })
            .collect();
        store.create_chunks(org, doc, chunks).await.unwrap();
        (store, org, doc)
    }

    fn verifier(store: Arc<InMemoryDocumentStore>, backend: Arc<ScriptedBackend>) -> DocumentVerifier {
        DocumentVerifier::new(
            store,
            Some(Arc::new(FailingEmbedder)),
            BackendChain::new(vec![backend as Arc<dyn GenerationBackend>]),
        )
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }

    #[test]
    fn test_interpret_valid_output() {
        let raw = r#"```json
        {"verdict": "Verified", "confidence": 1.7, "answer": " Yes, the migration ran. ",
         "citations": [{"chunk_index": 2, "reason": "mentions migration"}, {"chunk_index": 9, "reason": "not retrieved"}]}
        ```"#;
        let result = interpret(raw, citations(&[2, 0]));

        assert_eq!(result.verdict, Verdict::Verified);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.answer, "Yes, the migration ran.");
        assert_eq!(result.citations.len(), 2);
        assert_eq!(result.citations[0].reason.as_deref(), Some("mentions migration"));
        assert_eq!(result.citations[1].reason, None);
        assert!(result.citations.iter().all(|c| c.chunk_index != 9));
        assert!(result.raw_model_output.is_none());
    }

    #[test]
    fn test_interpret_unparseable_output() {
        let raw = "I think the document shows the work was done.";
        let result = interpret(raw, citations(&[0]));

        assert_eq!(result.verdict, Verdict::Insufficient);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.answer, raw);
        assert_eq!(result.raw_model_output.as_deref(), Some(raw));
        assert_eq!(result.citations.len(), 1);
    }

    #[test]
    fn test_unknown_verdict_degrades() {
        let raw = r#"{"verdict": "probably", "confidence": 0.4, "answer": "maybe"}"#;
        let result = interpret(raw, Vec::new());
        assert_eq!(result.verdict, Verdict::Insufficient);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_rank_prefers_cosine_then_keywords() {
        let chunk = |i: usize, content: &str, embedding: Option<Vec<f32>>| DocumentChunk {
            id: Uuid::new_v4(),
            org_id: Uuid::nil(),
            document_id: Uuid::nil(),
            chunk_index: i,
            content: content.into(),
            embedding,
            created_at: chrono::Utc::now(),
        };
        let chunks = vec![
            chunk(0, "budget budget budget", Some(vec![0.0, 1.0])),
            chunk(1, "nothing relevant", Some(vec![1.0, 0.0])),
        ];

        let by_vector = rank_chunks("budget", Some(&[1.0, 0.0]), &chunks, 1);
        assert_eq!(by_vector[0].index, 1);
        let lexical = rank_chunks("budget", None, &chunks, 1);
        assert_eq!(lexical[0].index, 0);
    }

    #[tokio::test]
    async fn test_verify_uses_lexical_fallback_and_snippets() {
        let long = format!("The migration to Postgres 16 completed. {}", "x".repeat(400));
        let (store, org, doc) =
            seeded_store(&["Meeting notes about lunch.", &long, "Budget table."]).await;
        let backend = Arc::new(ScriptedBackend::answering(
            "primary",
            r#"{"verdict":"verified","confidence":0.8,"answer":"Migration completed.","citations":[{"chunk_index":1,"reason":"states completion"}]}"#,
        ));

        let result = verifier(store, backend.clone())
            .verify(org, doc, "Was the migration completed?")
            .await
            .unwrap();

        assert_eq!(result.verdict, Verdict::Verified);
        assert_eq!(result.citations[0].chunk_index, 1);
        assert_eq!(result.citations[0].snippet.chars().count(), SNIPPET_CHARS);
        assert_eq!(result.citations[0].reason.as_deref(), Some("states completion"));
        assert!(backend.prompts()[0].contains("[Chunk 1]\nThe migration"));
    }

    #[tokio::test]
    async fn test_verify_with_embeddings() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(128));
        let store = Arc::new(InMemoryDocumentStore::new());
        let (org, doc) = (Uuid::new_v4(), Uuid::new_v4());
        let texts = ["Invoices were sent to every client", "The deployment finished on Friday"];
        let mut chunks = Vec::new();
        for t in texts {
            chunks.push(NewChunk {
                content: t.into(),
                embedding: Some(embedder.embed(t).await.unwrap()),
            });
        }
        store.create_chunks(org, doc, chunks).await.unwrap();

        let backend = Arc::new(ScriptedBackend::answering("primary", r#"{"verdict":"unverified","confidence":0.3,"answer":"No."}"#));
        let verifier = DocumentVerifier::new(
            store,
            Some(embedder),
            BackendChain::new(vec![backend as Arc<dyn GenerationBackend>]),
        )
        .with_top_k(1);

        let result = verifier.verify(org, doc, "When did the deployment finish?").await.unwrap();
        assert_eq!(result.verdict, Verdict::Unverified);
        assert_eq!(result.citations.len(), 1);
        assert_eq!(result.citations[0].chunk_index, 1);
    }

    #[tokio::test]
    async fn test_verify_without_chunks_or_question() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let backend = Arc::new(ScriptedBackend::answering("primary", "{}"));
        let verifier = verifier(store, backend);

        assert!(matches!(
            verifier.verify(Uuid::new_v4(), Uuid::new_v4(), "anything?").await,
            Err(AppError::NotFound { .. })
        ));
        assert!(matches!(
            verifier.verify(Uuid::new_v4(), Uuid::new_v4(), " ").await,
            Err(AppError::EmptyQuery)
        ));
    }

    #[tokio::test]
    async fn test_all_backends_failing_degrades() {
        let (store, org, doc) = seeded_store(&["Some content"]).await;
        let result = verifier(store, Arc::new(ScriptedBackend::failing("primary")))
            .verify(org, doc, "Is it done?")
            .await
            .unwrap();

        assert_eq!(result.verdict, Verdict::Insufficient);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.answer, INSUFFICIENT_DATA);
        assert_eq!(result.citations.len(), 1);
    }
}
