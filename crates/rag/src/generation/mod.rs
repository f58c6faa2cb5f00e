//! Text generation backends
//!
//! A [`GenerationBackend`] turns a prompt into text. Backends are tried in
//! order through a [`BackendChain`]: the first one returning non-empty text
//! wins, and earlier failures are logged but never surfaced while a later
//! backend succeeds. Each backend declares which prompt wording it expects,
//! so the chain renders the prompt per backend.

pub mod gemini;
pub mod intent;
pub mod openai;
pub mod prompts;

pub use gemini::GeminiBackend;
pub use openai::ChatCompletionsBackend;

use async_trait::async_trait;
use orgrag_common::config::{BackendKind, GenerationConfig};
use orgrag_common::errors::{AppError, Result};
use orgrag_common::metrics;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use orgrag_common::config::PromptStyle;

/// Something that can complete a prompt
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short name for logs and metrics
    fn name(&self) -> &str;

    /// Grounded prompt wording this backend receives
    fn prompt_style(&self) -> PromptStyle;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Text produced by the chain and the backend that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub text: String,
    pub backend: String,
}

/// Ordered list of backends tried in sequence
#[derive(Clone, Default)]
pub struct BackendChain {
    backends: Vec<Arc<dyn GenerationBackend>>,
}

impl BackendChain {
    pub fn new(backends: Vec<Arc<dyn GenerationBackend>>) -> Self {
        Self { backends }
    }

    /// Build backends from configuration, in configured order.
    ///
    /// Backends without an API key are skipped with a warning; an empty chain
    /// is valid and makes every generation fall back to static text.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let mut backends: Vec<Arc<dyn GenerationBackend>> = Vec::new();

        for backend in &config.backends {
            let Some(api_key) = backend.api_key.clone().filter(|k| !k.trim().is_empty()) else {
                warn!(kind = ?backend.kind, model = %backend.model, "Generation backend has no API key, skipping");
                continue;
            };

            let built: Arc<dyn GenerationBackend> = match backend.kind {
                BackendKind::Gemini => Arc::new(GeminiBackend::new(backend, config, api_key)?),
                BackendKind::OpenAi => {
                    Arc::new(ChatCompletionsBackend::new(backend, config, api_key)?)
                }
            };
            backends.push(built);
        }

        info!(
            backends = ?backends.iter().map(|b| b.name().to_string()).collect::<Vec<_>>(),
            "Generation chain configured"
        );
        Ok(Self { backends })
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Send the same prompt to each backend in turn
    pub async fn generate(&self, prompt: &str) -> Result<Generated> {
        self.generate_with(|_| prompt.to_string()).await
    }

    /// Render the prompt for each backend's style and try them in turn.
    ///
    /// Fails with `GenerationFailure` only when every backend failed or
    /// returned blank text, or the chain is empty.
    pub async fn generate_with<F>(&self, render: F) -> Result<Generated>
    where
        F: Fn(PromptStyle) -> String + Send + Sync,
    {
        if self.backends.is_empty() {
            return Err(AppError::GenerationFailure {
                message: "no generation backends configured".to_string(),
            });
        }

        let mut failures = Vec::with_capacity(self.backends.len());

        for backend in &self.backends {
            let prompt = render(backend.prompt_style());
            match backend.generate(&prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    metrics::record_generation(backend.name(), true);
                    debug!(backend = backend.name(), chars = text.len(), "Generation succeeded");
                    return Ok(Generated {
                        text: text.trim().to_string(),
                        backend: backend.name().to_string(),
                    });
                }
                Ok(_) => {
                    metrics::record_generation(backend.name(), false);
                    warn!(backend = backend.name(), "Backend returned empty output, trying next");
                    failures.push(format!("{}: empty output", backend.name()));
                }
                Err(e) => {
                    metrics::record_generation(backend.name(), false);
                    warn!(backend = backend.name(), error = %e, "Backend failed, trying next");
                    failures.push(format!("{}: {}", backend.name(), e));
                }
            }
        }

        Err(AppError::GenerationFailure {
            message: failures.join("; "),
        })
    }
}
