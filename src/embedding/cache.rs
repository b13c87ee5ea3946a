//! Truncating, caching front end over an [`EmbeddingProvider`].

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use tracing::{debug, warn};

use memory_harness_core::context::truncate_chars;
use memory_harness_core::embedding::{is_usable_vector, EmbeddingProvider};

use super::DisabledProvider;
use crate::config::EmbeddingConfig;

/// Wraps a provider with input truncation and a bounded LRU cache.
///
/// Every failure mode (empty input, provider error, malformed output,
/// dimension mismatch) yields `None`; only usable vectors are cached.
pub struct CachedEmbedder {
    provider: Box<dyn EmbeddingProvider>,
    cache: LruCache<String, Vec<f32>>,
    max_text_chars: usize,
    expected_dims: Option<usize>,
}

impl CachedEmbedder {
    pub fn new(
        provider: Box<dyn EmbeddingProvider>,
        cache_size: usize,
        max_text_chars: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        let expected_dims = Some(provider.dims()).filter(|d| *d > 0);
        Self {
            provider,
            cache: LruCache::new(capacity),
            max_text_chars: max_text_chars.max(1),
            expected_dims,
        }
    }

    /// Build from config, taking `dims` from config over the provider's own.
    pub fn from_config(provider: Box<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        let mut embedder = Self::new(provider, config.cache_size, config.max_text_chars);
        if config.dims.is_some() {
            embedder.expected_dims = config.dims;
        }
        embedder
    }

    /// An embedder that never produces vectors.
    pub fn disabled() -> Self {
        Self::new(Box::new(DisabledProvider), 1, 1)
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Dimensionality every returned vector is checked against, if known.
    pub fn expected_dims(&self) -> Option<usize> {
        self.expected_dims
    }

    /// Number of cached vectors.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Embed one text, or `None` if no usable vector could be produced.
    pub fn embed_text(&mut self, text: &str) -> Option<Vec<f32>> {
        if text.trim().is_empty() {
            return None;
        }

        let truncated = truncate_chars(text, self.max_text_chars);
        let key = cache_key(truncated);
        if let Some(hit) = self.cache.get(&key) {
            return Some(hit.clone());
        }

        let vector = match self.provider.embed(&[truncated.to_string()]) {
            Ok(vectors) => vectors.into_iter().next(),
            Err(e) => {
                debug!("embedding failed ({}): {:#}", self.provider.model_name(), e);
                return None;
            }
        };

        let vector = vector.filter(|v| is_usable_vector(v))?;
        if let Some(dims) = self.expected_dims {
            if vector.len() != dims {
                warn!(
                    "embedding has {} dimensions, expected {}; discarding",
                    vector.len(),
                    dims
                );
                return None;
            }
        }

        self.cache.put(key, vector.clone());
        Some(vector)
    }
}

fn cache_key(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Maps text length to a 2-d vector and counts calls.
    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        output: Option<Vec<f32>>,
    }

    impl EmbeddingProvider for CountingProvider {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            0
        }
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.output {
                Some(v) => Ok(vec![v.clone()]),
                None => Ok(texts
                    .iter()
                    .map(|t| vec![t.chars().count() as f32, 1.0])
                    .collect()),
            }
        }
    }

    struct FailingProvider;

    impl EmbeddingProvider for FailingProvider {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            2
        }
        fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            bail!("connection refused")
        }
    }

    fn counting(
        output: Option<Vec<f32>>,
        cache: usize,
        max_chars: usize,
    ) -> (CachedEmbedder, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = CountingProvider {
            calls: calls.clone(),
            output,
        };
        (CachedEmbedder::new(Box::new(provider), cache, max_chars), calls)
    }

    #[test]
    fn test_empty_input_skips_provider() {
        let (mut embedder, calls) = counting(None, 10, 100);
        assert!(embedder.embed_text("").is_none());
        assert!(embedder.embed_text("   \n").is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cache_hit_avoids_second_call() {
        let (mut embedder, calls) = counting(None, 10, 100);
        let a = embedder.embed_text("hello").unwrap();
        let b = embedder.embed_text("hello").unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(embedder.cached(), 1);
    }

    #[test]
    fn test_lru_evicts_least_recently_used() {
        let (mut embedder, calls) = counting(None, 2, 100);
        embedder.embed_text("a");
        embedder.embed_text("bb");
        embedder.embed_text("a");
        embedder.embed_text("ccc");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        embedder.embed_text("a");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        embedder.embed_text("bb");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_truncates_before_embedding() {
        let (mut embedder, _calls) = counting(None, 10, 4);
        let v = embedder.embed_text("abcdefgh").unwrap();
        assert_eq!(v[0], 4.0);
        // Same prefix, same cache entry.
        assert_eq!(embedder.embed_text("abcdXYZ").unwrap(), v);
    }

    #[test]
    fn test_provider_error_is_none() {
        let mut embedder = CachedEmbedder::new(Box::new(FailingProvider), 10, 100);
        assert!(embedder.embed_text("hello").is_none());
        assert_eq!(embedder.cached(), 0);
    }

    #[test]
    fn test_non_finite_output_is_none() {
        let (mut embedder, _) = counting(Some(vec![1.0, f32::NAN]), 10, 100);
        assert!(embedder.embed_text("hello").is_none());
        let (mut embedder, _) = counting(Some(vec![]), 10, 100);
        assert!(embedder.embed_text("hello").is_none());
    }

    #[test]
    fn test_dimension_mismatch_is_none() {
        let config = EmbeddingConfig {
            dims: Some(3),
            ..EmbeddingConfig::default()
        };
        let provider = CountingProvider {
            calls: Arc::new(AtomicUsize::new(0)),
            output: None,
        };
        let mut embedder = CachedEmbedder::from_config(Box::new(provider), &config);
        assert_eq!(embedder.expected_dims(), Some(3));
        assert!(embedder.embed_text("hello").is_none());
    }

    #[test]
    fn test_disabled_never_embeds() {
        let mut embedder = CachedEmbedder::disabled();
        assert_eq!(embedder.model_name(), "disabled");
        assert!(embedder.embed_text("anything").is_none());
    }
}
