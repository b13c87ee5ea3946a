//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] capability that all embedding backends
//! implement, plus pure helper functions for similarity computation.
//!
//! Concrete providers (OpenAI, Ollama, fastembed) and the caching wrapper
//! live in the `memory-harness` app crate. Consumers must treat a missing
//! embedding as "use the default similarity", never as an error.

use anyhow::Result;

/// Trait for embedding providers.
///
/// Implementations are created by the application at startup. A provider
/// that cannot embed (no model configured, model failed to load) still
/// implements this trait and returns errors from [`embed`](Self::embed).
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality, or `0` if unknown.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-norm vector. Accumulates in `f64`.
///
/// # Formula
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Whether every component of the vector is finite and it is non-empty.
pub fn is_usable_vector(v: &[f32]) -> bool {
    !v.is_empty() && v.iter().all(|x| x.is_finite())
}
