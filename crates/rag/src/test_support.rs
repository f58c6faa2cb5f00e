//! Test doubles shared by the crate's unit tests

use crate::generation::{GenerationBackend, PromptStyle};
use crate::retriever::{RetrievalRequest, Retriever};
use crate::types::SimilarityHit;
use async_trait::async_trait;
use orgrag_common::embeddings::Embedder;
use orgrag_common::errors::{AppError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Embedder that is always unavailable
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(AppError::EmbeddingUnavailable {
            message: "embedding quota exhausted".into(),
        })
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(AppError::EmbeddingUnavailable {
            message: "embedding quota exhausted".into(),
        })
    }

    fn model_name(&self) -> &str {
        "failing"
    }

    fn dimension(&self) -> usize {
        8
    }
}

/// Embedder that panics, for failure-containment tests
pub struct PanickingEmbedder;

#[async_trait]
impl Embedder for PanickingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        panic!("embedder crashed")
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        panic!("embedder crashed")
    }

    fn model_name(&self) -> &str {
        "panicking"
    }

    fn dimension(&self) -> usize {
        8
    }
}

/// Backend returning a fixed reply and recording the prompts it saw
pub struct ScriptedBackend {
    name: String,
    style: PromptStyle,
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn answering(name: &str, reply: &str) -> Self {
        Self {
            name: name.into(),
            style: PromptStyle::Direct,
            reply: Some(reply.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            name: name.into(),
            style: PromptStyle::Direct,
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_style(mut self, style: PromptStyle) -> Self {
        self.style = style;
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn prompt_style(&self) -> PromptStyle {
        self.style
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().ok_or_else(|| AppError::GenerationFailure {
            message: format!("{} is down", self.name),
        })
    }
}

/// Retriever returning canned hits and counting calls
pub struct CountingRetriever {
    hits: Option<Vec<SimilarityHit>>,
    calls: AtomicUsize,
}

impl CountingRetriever {
    pub fn returning(hits: Vec<SimilarityHit>) -> Self {
        Self {
            hits: Some(hits),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails as if the embedder were down
    pub fn failing() -> Self {
        Self {
            hits: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for CountingRetriever {
    async fn retrieve(&self, _request: &RetrievalRequest) -> Result<Vec<SimilarityHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hits.clone().ok_or_else(|| AppError::EmbeddingUnavailable {
            message: "embedding quota exhausted".into(),
        })
    }
}
