//! Text chunking and ranking
//!
//! Splits long text into overlapping character windows and ranks windows
//! against a question, by cosine similarity when embeddings exist and by a
//! lexical overlap score otherwise. Nothing in here fails.

use regex_lite::Regex;
use std::sync::OnceLock;

/// Default window size in characters
pub const DEFAULT_CHUNK_SIZE: usize = 1200;

/// Default overlap between consecutive windows
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Default cap on windows produced for one text
pub const DEFAULT_MAX_CHUNKS: usize = 200;

/// Default number of results kept by `top_k`
pub const DEFAULT_TOP_K: usize = 5;

/// Shortest query token that counts for lexical scoring
const MIN_KEYWORD_LEN: usize = 3;

/// Configuration for text chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Window size in characters (code points)
    pub chunk_size: usize,
    /// Characters shared by consecutive windows; coerced to `chunk_size / 4` if not smaller than `chunk_size`
    pub chunk_overlap: usize,
    /// Maximum windows produced
    pub max_chunks: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_chunks: DEFAULT_MAX_CHUNKS,
        }
    }
}

impl ChunkingConfig {
    /// Window size, overlap and step after applying defaults and coercions
    fn effective(&self) -> (usize, usize, usize) {
        let size = if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        };
        let overlap = if self.chunk_overlap >= size {
            size / 4
        } else {
            self.chunk_overlap
        };
        (size, overlap, size - overlap)
    }

    /// Characters each window after the first repeats from its predecessor
    pub fn overlap(&self) -> usize {
        self.effective().1
    }
}

/// Split text into overlapping windows on character boundaries.
///
/// Windows are taken at `0, step, 2*step, ...` with `step = size - overlap`
/// until the text ends or `max_chunks` windows were considered.
/// Whitespace-only windows are dropped; the others are returned verbatim.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let (size, _, step) = config.effective();
    let max_chunks = if config.max_chunks == 0 {
        DEFAULT_MAX_CHUNKS
    } else {
        config.max_chunks
    };

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut windows = 0;

    while start < total && windows < max_chunks {
        let end = (start + size).min(total);
        let window: String = chars[start..end].iter().collect();
        windows += 1;

        if !window.trim().is_empty() {
            chunks.push(window);
        }
        if end == total {
            break;
        }
        start += step;
    }

    tracing::debug!(
        input_chars = total,
        chunk_count = chunks.len(),
        chunk_size = size,
        "Text chunked"
    );

    chunks
}

/// Cosine similarity of two vectors.
///
/// Returns 0 for mismatched lengths, empty input or a zero-norm vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0f64, 0f64, 0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Position of an item in its original list plus its score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredIndex {
    pub index: usize,
    pub score: f64,
}

/// Stable sort by score descending, keeping at most `k` (0 means the default of 5).
/// Equal scores keep their input order.
pub fn top_k(mut scored: Vec<ScoredIndex>, k: usize) -> Vec<ScoredIndex> {
    let k = if k == 0 { DEFAULT_TOP_K } else { k };
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[A-Za-z0-9]+").expect("static token pattern"))
}

/// Lexical relevance of `chunk` to `query`.
///
/// Sum, over query tokens of at least 3 alphanumeric characters, of the
/// number of case-insensitive occurrences of the token in the chunk.
pub fn keyword_score(query: &str, chunk: &str) -> f64 {
    let query = query.to_lowercase();
    let chunk = chunk.to_lowercase();

    token_pattern()
        .find_iter(&query)
        .map(|m| m.as_str())
        .filter(|token| token.len() >= MIN_KEYWORD_LEN)
        .map(|token| chunk.matches(token).count() as f64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, chunk_overlap: usize, max_chunks: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            chunk_overlap,
            max_chunks,
        }
    }

    #[test]
    fn test_windows_overlap() {
        let chunks = chunk_text("abcdefghij", &config(4, 1, 10));
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let cfg = config(100, 30, 50);
        assert_eq!(chunk_text(&text, &cfg), chunk_text(&text, &cfg));
    }

    #[test]
    fn test_overlap_removed_reconstructs_prefix() {
        let text = "Zażółć gęślą jaźń, multilingual text keeps code points intact. ".repeat(12);
        let cfg = config(50, 10, 7);
        let chunks = chunk_text(&text, &cfg);
        assert_eq!(chunks.len(), 7);

        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.chars().skip(10));
        }
        assert!(text.starts_with(&rebuilt));
        assert_eq!(rebuilt.chars().count(), 50 + 6 * 40);
    }

    #[test]
    fn test_full_text_reconstructed_when_uncapped() {
        let text = "0123456789abcdefghijklmnopqrstuvwxyz";
        let chunks = chunk_text(text, &config(10, 3, 100));
        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.chars().skip(3));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_no_empty_chunks() {
        let text = format!("{}{}{}", "a".repeat(10), " ".repeat(30), "b".repeat(10));
        let chunks = chunk_text(&text, &config(10, 0, 100));
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| !c.trim().is_empty()));

        assert!(chunk_text("", &ChunkingConfig::default()).is_empty());
        assert!(chunk_text("   \n\t ", &ChunkingConfig::default()).is_empty());
    }

    #[test]
    fn test_overlap_coerced_when_too_large() {
        // overlap >= size becomes size / 4 = 2, so step is 6
        let chunks = chunk_text("abcdefghijklmnop", &config(8, 8, 10));
        assert_eq!(chunks, vec!["abcdefgh", "ghijklmn", "mnop"]);
        assert_eq!(config(8, 8, 10).overlap(), 2);
        assert_eq!(config(8, 3, 10).overlap(), 3);
    }

    #[test]
    fn test_max_chunks_cap() {
        let text = "x".repeat(10_000);
        assert_eq!(chunk_text(&text, &config(10, 0, 3)).len(), 3);
    }

    #[test]
    fn test_cosine_bounds_and_symmetry() {
        let a = [1.0, 2.0, 3.0];
        let b = [-2.0, 0.5, 4.0];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&a, &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_top_k_stable_descending() {
        let scored = vec![
            ScoredIndex { index: 0, score: 0.5 },
            ScoredIndex { index: 1, score: 0.9 },
            ScoredIndex { index: 2, score: 0.5 },
            ScoredIndex { index: 3, score: 0.1 },
        ];
        let top = top_k(scored, 3);
        let order: Vec<usize> = top.iter().map(|s| s.index).collect();
        assert_eq!(order, vec![1, 0, 2]);
    }

    #[test]
    fn test_top_k_default() {
        let scored = (0..8).map(|i| ScoredIndex { index: i, score: i as f64 }).collect();
        assert_eq!(top_k(scored, 0).len(), DEFAULT_TOP_K);
    }

    #[test]
    fn test_keyword_score() {
        let chunk = "Login fails on mobile. The LOGIN screen freezes after login.";
        assert_eq!(keyword_score("login problem", chunk), 3.0);
        // tokens shorter than three characters are ignored
        assert_eq!(keyword_score("on it", chunk), 0.0);
        assert_eq!(keyword_score("", chunk), 0.0);
        assert_eq!(keyword_score("mobile screen", chunk), 2.0);
    }
}
