//! Supersession policy.
//!
//! A new fact replaces an existing one when both share scope and kind and
//! their embeddings are nearly parallel. The replaced fact is tombstoned and
//! linked to its successor, and facts that declared a dependency on it are
//! flagged for review (one hop only).
//!
//! Scope and kind form the partition key: facts never supersede across
//! either boundary, however similar their text.

use crate::embedding::cosine_similarity;
use crate::models::Fact;

/// Cosine similarity a candidate must exceed to be superseded.
pub const SUPERSESSION_THRESHOLD: f64 = 0.85;

/// Confidence added to the successor on top of the replaced fact's.
pub const CONFIDENCE_CARRY_BOOST: f64 = 0.05;

/// Outcome of one supersession.
#[derive(Debug, Clone, PartialEq)]
pub struct Supersession {
    pub superseded_id: String,
    pub successor_id: String,
    pub similarity: f64,
    /// Ids of facts newly flagged `needs_review`.
    pub review_marked: Vec<String>,
}

/// Find the index of the fact `new_fact` should supersede.
///
/// Candidates are valid facts with an embedding, in the same scope and kind.
/// The highest similarity strictly above `threshold` wins; on an exact tie
/// the earliest in `facts` is kept. Returns `None` when `new_fact` has no
/// embedding.
pub fn find_candidate(facts: &[Fact], new_fact: &Fact, threshold: f64) -> Option<(usize, f64)> {
    let new_vec = new_fact.embedding.as_deref()?;

    let mut best: Option<(usize, f64)> = None;
    for (idx, fact) in facts.iter().enumerate() {
        if !fact.is_valid || fact.id == new_fact.id {
            continue;
        }
        if fact.scope != new_fact.scope || fact.kind != new_fact.kind {
            continue;
        }
        let Some(existing) = fact.embedding.as_deref() else {
            continue;
        };

        let sim = cosine_similarity(new_vec, existing);
        let best_sim = best.map(|(_, s)| s).unwrap_or(0.0);
        if sim > threshold && sim > best_sim {
            best = Some((idx, sim));
        }
    }
    best
}

/// Supersede `facts[old_idx]` with `new_fact`.
///
/// Tombstones the old fact, links both directions, sets the successor's
/// confidence to `min(1.0, old + 0.05)`, then cascades `needs_review` to
/// valid dependents of the old fact. `new_fact` must not yet be in `facts`.
pub fn supersede(
    facts: &mut [Fact],
    old_idx: usize,
    new_fact: &mut Fact,
    similarity: f64,
) -> Supersession {
    let old = &mut facts[old_idx];
    old.invalidate();
    old.superseded_by = Some(new_fact.id.clone());
    new_fact.supersedes = Some(old.id.clone());
    new_fact.set_confidence((old.metadata.confidence + CONFIDENCE_CARRY_BOOST).min(1.0));

    let superseded_id = old.id.clone();
    let review_marked = cascade_needs_review(facts, &superseded_id);

    Supersession {
        superseded_id,
        successor_id: new_fact.id.clone(),
        similarity,
        review_marked,
    }
}

/// Flag every valid fact depending on `superseded_id` as needing review.
///
/// Does not recurse: dependents of the flagged facts are untouched.
/// Returns the ids of facts whose flag changed.
pub fn cascade_needs_review(facts: &mut [Fact], superseded_id: &str) -> Vec<String> {
    let mut marked = Vec::new();
    for fact in facts.iter_mut() {
        if fact.is_valid && fact.depends_on.iter().any(|d| d == superseded_id) {
            if !fact.needs_review {
                marked.push(fact.id.clone());
            }
            fact.needs_review = true;
        }
    }
    marked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FactKind, FactScope};

    fn fact(kind: FactKind, scope: FactScope, embedding: Vec<f32>) -> Fact {
        Fact::new("subject", "body", kind, scope).with_embedding(Some(embedding))
    }

    /// Unit vector at cosine `c` from [1, 0].
    fn at_cosine(c: f32) -> Vec<f32> {
        vec![c, (1.0 - c * c).sqrt()]
    }

    #[test]
    fn test_candidate_above_threshold() {
        let facts = vec![fact(FactKind::Pattern, FactScope::Project, vec![1.0, 0.0])];
        let new_fact = fact(FactKind::Pattern, FactScope::Project, at_cosine(0.95));
        let (idx, sim) = find_candidate(&facts, &new_fact, SUPERSESSION_THRESHOLD).unwrap();
        assert_eq!(idx, 0);
        assert!((sim - 0.95).abs() < 1e-4);
    }

    #[test]
    fn test_no_candidate_at_or_below_threshold() {
        let facts = vec![fact(FactKind::Pattern, FactScope::Project, vec![1.0, 0.0])];
        let new_fact = fact(FactKind::Pattern, FactScope::Project, at_cosine(0.80));
        assert!(find_candidate(&facts, &new_fact, SUPERSESSION_THRESHOLD).is_none());
    }

    #[test]
    fn test_no_cross_kind_or_scope_candidate() {
        let facts = vec![
            fact(FactKind::Decision, FactScope::Project, vec![1.0, 0.0]),
            fact(FactKind::Pattern, FactScope::Global, vec![1.0, 0.0]),
        ];
        let new_fact = fact(FactKind::Pattern, FactScope::Project, at_cosine(0.99));
        assert!(find_candidate(&facts, &new_fact, SUPERSESSION_THRESHOLD).is_none());
    }

    #[test]
    fn test_highest_similarity_wins() {
        let facts = vec![
            fact(FactKind::Pattern, FactScope::Project, at_cosine(0.90)),
            fact(FactKind::Pattern, FactScope::Project, at_cosine(0.97)),
            fact(FactKind::Pattern, FactScope::Project, at_cosine(0.92)),
        ];
        let new_fact = fact(FactKind::Pattern, FactScope::Project, vec![1.0, 0.0]);
        let (idx, _) = find_candidate(&facts, &new_fact, SUPERSESSION_THRESHOLD).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn test_exact_tie_keeps_first() {
        let facts = vec![
            fact(FactKind::Pattern, FactScope::Project, vec![1.0, 0.0]),
            fact(FactKind::Pattern, FactScope::Project, vec![1.0, 0.0]),
        ];
        let new_fact = fact(FactKind::Pattern, FactScope::Project, vec![1.0, 0.0]);
        let (idx, _) = find_candidate(&facts, &new_fact, SUPERSESSION_THRESHOLD).unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn test_invalid_and_unembedded_facts_skipped() {
        let mut old = fact(FactKind::Pattern, FactScope::Project, vec![1.0, 0.0]);
        old.invalidate();
        let bare = Fact::new("s", "b", FactKind::Pattern, FactScope::Project);
        let facts = vec![old, bare];
        let new_fact = fact(FactKind::Pattern, FactScope::Project, vec![1.0, 0.0]);
        assert!(find_candidate(&facts, &new_fact, SUPERSESSION_THRESHOLD).is_none());
    }

    #[test]
    fn test_new_fact_without_embedding_never_supersedes() {
        let facts = vec![fact(FactKind::Pattern, FactScope::Project, vec![1.0, 0.0])];
        let new_fact = Fact::new("s", "b", FactKind::Pattern, FactScope::Project);
        assert!(find_candidate(&facts, &new_fact, SUPERSESSION_THRESHOLD).is_none());
    }

    #[test]
    fn test_supersede_links_and_boosts() {
        let old = fact(FactKind::Pattern, FactScope::Project, vec![1.0, 0.0]).with_confidence(0.5);
        let mut facts = vec![old];
        let mut new_fact =
            fact(FactKind::Pattern, FactScope::Project, at_cosine(0.95)).with_confidence(0.1);

        let outcome = supersede(&mut facts, 0, &mut new_fact, 0.95);

        assert!(!facts[0].is_valid);
        assert_eq!(facts[0].superseded_by.as_deref(), Some(new_fact.id.as_str()));
        assert_eq!(new_fact.supersedes.as_deref(), Some(facts[0].id.as_str()));
        assert!((new_fact.metadata.confidence - 0.55).abs() < 1e-9);
        assert_eq!(outcome.superseded_id, facts[0].id);
    }

    #[test]
    fn test_boost_caps_at_one() {
        let old = fact(FactKind::Pattern, FactScope::Project, vec![1.0, 0.0]).with_confidence(0.98);
        let mut facts = vec![old];
        let mut new_fact = fact(FactKind::Pattern, FactScope::Project, vec![1.0, 0.0]);
        supersede(&mut facts, 0, &mut new_fact, 1.0);
        assert_eq!(new_fact.metadata.confidence, 1.0);
    }

    #[test]
    fn test_cascade_one_hop() {
        let root = fact(FactKind::Pattern, FactScope::Project, vec![1.0, 0.0]);
        let mut child = Fact::new("child", "b", FactKind::Decision, FactScope::Project);
        child.depends_on = vec![root.id.clone()];
        let mut grandchild = Fact::new("grandchild", "b", FactKind::Decision, FactScope::Project);
        grandchild.depends_on = vec![child.id.clone()];
        let unrelated = Fact::new("unrelated", "b", FactKind::Decision, FactScope::Project);
        let mut invalid_child = Fact::new("old child", "b", FactKind::Decision, FactScope::Project);
        invalid_child.depends_on = vec![root.id.clone()];
        invalid_child.invalidate();

        let mut facts = vec![root, child, grandchild, unrelated, invalid_child];
        let mut new_fact = fact(FactKind::Pattern, FactScope::Project, vec![1.0, 0.0]);
        let outcome = supersede(&mut facts, 0, &mut new_fact, 1.0);

        assert!(facts[1].needs_review);
        assert!(!facts[2].needs_review);
        assert!(!facts[3].needs_review);
        assert!(!facts[4].needs_review);
        assert_eq!(outcome.review_marked, vec![facts[1].id.clone()]);
    }
}
