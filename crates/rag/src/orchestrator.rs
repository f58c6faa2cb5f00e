//! Question answering
//!
//! Decision tree per question:
//! 1. reject an empty question or an unknown role
//! 2. conversational turn: answer with an introduction, no retrieval
//! 3. no hits (or retrieval failed): "nothing found" reply with suggestions
//! 4. hits: grounded answer over the hits, which are returned as sources
//!
//! Past step 1 every path ends in an answer string; generation failures fall
//! back to fixed text.

use crate::generation::intent::is_conversational;
use crate::generation::prompts::{
    grounded_prompt, introduction_prompt, no_hits_prompt, FALLBACK_INTRODUCTION,
    FALLBACK_NO_HITS, INSUFFICIENT_DATA,
};
use crate::generation::BackendChain;
use crate::retriever::{RetrievalRequest, Retriever, DEFAULT_RETRIEVAL_LIMIT};
use crate::types::{Role, SimilarityHit};
use orgrag_common::errors::{AppError, Result};
use orgrag_common::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    /// Every hit handed to the generator, cited or not
    pub sources: Vec<SimilarityHit>,
}

/// Which branch answered a question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnswerPath {
    Conversational,
    NoHits,
    Grounded,
}

impl AnswerPath {
    fn as_str(&self) -> &'static str {
        match self {
            AnswerPath::Conversational => "conversational",
            AnswerPath::NoHits => "no_hits",
            AnswerPath::Grounded => "grounded",
        }
    }
}

pub struct GenerationOrchestrator {
    retriever: Arc<dyn Retriever>,
    chain: BackendChain,
    query_limit: usize,
}

impl GenerationOrchestrator {
    pub fn new(retriever: Arc<dyn Retriever>, chain: BackendChain) -> Self {
        Self {
            retriever,
            chain,
            query_limit: DEFAULT_RETRIEVAL_LIMIT,
        }
    }

    pub fn with_query_limit(mut self, query_limit: usize) -> Self {
        self.query_limit = query_limit;
        self
    }

    /// Answer a question for `(org, user, role)`.
    ///
    /// Fails only with `EmptyQuery` or `InvalidRole`.
    #[instrument(skip(self, request), fields(org_id = %request.org_id, role = %request.role))]
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse> {
        let start = Instant::now();
        let question = request.question.trim();
        if question.is_empty() {
            return Err(AppError::EmptyQuery);
        }
        request
            .role
            .parse::<Role>()
            .map_err(|_| AppError::InvalidRole {
                role: request.role.clone(),
            })?;

        let (path, response) = if is_conversational(question) {
            let answer = self
                .answer_or(&introduction_prompt(question), FALLBACK_INTRODUCTION)
                .await;
            (AnswerPath::Conversational, QueryResponse { answer, sources: Vec::new() })
        } else {
            let hits = self.retrieve(&request, question).await;
            if hits.is_empty() {
                let answer = self.answer_or(&no_hits_prompt(question), FALLBACK_NO_HITS).await;
                (AnswerPath::NoHits, QueryResponse { answer, sources: Vec::new() })
            } else {
                let answer = match self
                    .chain
                    .generate_with(|style| grounded_prompt(style, question, &hits))
                    .await
                {
                    Ok(generated) => generated.text,
                    Err(e) => {
                        warn!(error = %e, "Grounded generation failed on every backend");
                        INSUFFICIENT_DATA.to_string()
                    }
                };
                (AnswerPath::Grounded, QueryResponse { answer, sources: hits })
            }
        };

        let elapsed = start.elapsed();
        metrics::record_query(elapsed.as_secs_f64(), path.as_str(), response.sources.len());
        info!(
            path = path.as_str(),
            sources = response.sources.len(),
            latency_ms = elapsed.as_millis() as u64,
            "Question answered"
        );

        Ok(response)
    }

    async fn retrieve(&self, request: &QueryRequest, question: &str) -> Vec<SimilarityHit> {
        let retrieval = RetrievalRequest::new(
            request.org_id,
            request.user_id,
            request.role.clone(),
            question,
        )
        .with_limit(self.query_limit);

        match self.retriever.retrieve(&retrieval).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Retrieval failed, answering without context");
                Vec::new()
            }
        }
    }

    async fn answer_or(&self, prompt: &str, fallback: &str) -> String {
        match self.chain.generate(prompt).await {
            Ok(generated) => generated.text,
            Err(e) => {
                warn!(error = %e, "Generation failed, using static reply");
                fallback.to_string()
            }
        }
    }
}
