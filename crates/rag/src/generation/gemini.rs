//! Google Gemini `generateContent` backend

use super::{GenerationBackend, PromptStyle};
use async_trait::async_trait;
use orgrag_common::config::{BackendConfig, GenerationConfig};
use orgrag_common::errors::{AppError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: SamplingConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SamplingConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize, Debug)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize, Debug)]
struct PartResponse {
    #[serde(default)]
    text: String,
}

/// Backend for the Gemini REST API
pub struct GeminiBackend {
    client: Client,
    endpoint: String,
    api_key: String,
    name: String,
    prompt_style: PromptStyle,
    sampling_temperature: f32,
    max_output_tokens: u32,
}

impl GeminiBackend {
    pub fn new(backend: &BackendConfig, generation: &GenerationConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(generation.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let base = backend
            .api_base
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/');

        Ok(Self {
            client,
            endpoint: format!("{}/models/{}:generateContent", base, backend.model),
            api_key,
            name: format!("gemini:{}", backend.model),
            prompt_style: backend.prompt_style,
            sampling_temperature: generation.temperature,
            max_output_tokens: generation.max_output_tokens,
        })
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn prompt_style(&self) -> PromptStyle {
        self.prompt_style
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: SamplingConfig {
                temperature: self.sampling_temperature,
                top_p: 0.8,
                top_k: 40,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", &self.api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::GenerationFailure {
                message: format!("Gemini request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GenerationFailure {
                message: format!("Gemini API error {}: {}", status, body),
            });
        }

        let parsed: GeminiResponse = response.json().await.map_err(|e| AppError::GenerationFailure {
            message: format!("failed to parse Gemini response: {}", e),
        })?;

        // An empty candidate list is a blank answer, not an error; the chain moves on
        Ok(parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default())
    }
}
