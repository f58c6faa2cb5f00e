//! Embedding calls made by the RAG core, truncated and timed

use orgrag_common::embeddings::Embedder;
use orgrag_common::errors::Result;
use orgrag_common::metrics;
use std::time::Instant;

/// Default cap on characters sent to the embedder
pub const DEFAULT_MAX_EMBED_CHARS: usize = 8000;

/// First `max_chars` characters of `text`
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Embed `text` capped at `max_chars`, recording latency and outcome
pub async fn embed_capped(embedder: &dyn Embedder, text: &str, max_chars: usize) -> Result<Vec<f32>> {
    let input = truncate_chars(text, max_chars);
    let start = Instant::now();
    let result = embedder.embed(input).await;

    metrics::record_embedding(
        start.elapsed().as_secs_f64(),
        embedder.model_name(),
        1,
        result.is_ok(),
    );
    result
}
