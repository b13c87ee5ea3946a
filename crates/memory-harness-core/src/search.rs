//! Relevance scoring for facts.
//!
//! The scoring function is shared by the store's `retrieve_relevant` and
//! by context assembly, so both rank identically.
//!
//! # Scoring Algorithm
//!
//! ```text
//! score = similarity × confidence × (0.5 + 0.5 × recency)
//! recency = 0.5 ^ (age_days / 30)
//! ```
//!
//! 1. `similarity` is the cosine between query and fact embeddings, or
//!    [`DEFAULT_SIMILARITY`] when either vector is absent or the lengths
//!    differ.
//! 2. `age_days` is measured from the fact's `last_accessed` timestamp and
//!    never negative.
//! 3. Results sort by score descending; equal scores keep input order.

use chrono::{DateTime, Utc};

use crate::embedding::cosine_similarity;
use crate::models::Fact;

/// Similarity used whenever a query or fact embedding is missing.
pub const DEFAULT_SIMILARITY: f64 = 0.5;

/// Half-life of the recency factor, in days.
pub const RECENCY_HALF_LIFE_DAYS: f64 = 30.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// A fact paired with its relevance score.
#[derive(Debug, Clone, Copy)]
pub struct ScoredFact<'a> {
    pub fact: &'a Fact,
    pub score: f64,
}

/// Similarity between the query and a fact, defaulting when either
/// embedding is missing or the two lengths differ.
pub fn similarity(query_vec: Option<&[f32]>, fact: &Fact) -> f64 {
    match (query_vec, fact.embedding.as_deref()) {
        (Some(q), Some(f)) if q.len() == f.len() => cosine_similarity(q, f),
        _ => DEFAULT_SIMILARITY,
    }
}

/// Exponential recency decay in `(0.0, 1.0]`.
pub fn recency(last_accessed: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_secs = (now - last_accessed).num_milliseconds() as f64 / 1000.0;
    let age_days = (age_secs / SECONDS_PER_DAY).max(0.0);
    0.5f64.powf(age_days / RECENCY_HALF_LIFE_DAYS)
}

/// Composite relevance score of a fact for a query.
pub fn relevance_score(fact: &Fact, query_vec: Option<&[f32]>, now: DateTime<Utc>) -> f64 {
    let sim = similarity(query_vec, fact);
    let recency = recency(fact.metadata.last_accessed, now);
    sim * fact.metadata.confidence * (0.5 + 0.5 * recency)
}

/// Score and sort facts, highest first. The sort is stable.
pub fn rank_facts<'a, I>(
    facts: I,
    query_vec: Option<&[f32]>,
    now: DateTime<Utc>,
) -> Vec<ScoredFact<'a>>
where
    I: IntoIterator<Item = &'a Fact>,
{
    let mut scored: Vec<ScoredFact<'a>> = facts
        .into_iter()
        .map(|fact| ScoredFact {
            fact,
            score: relevance_score(fact, query_vec, now),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    scored
}
