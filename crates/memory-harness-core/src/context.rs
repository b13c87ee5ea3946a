//! Context assembly for prompt injection.
//!
//! Partitions a fact collection into presentation layers and renders them
//! as a markdown block. Works on any slice of facts; it does not know about
//! the store.
//!
//! # Layer Rules
//!
//! Evaluated per fact, first match wins:
//!
//! | Condition | Layer |
//! |-----------|-------|
//! | valid constraint | constraints (sorted by scope, stable) |
//! | valid known unknown | known unknowns |
//! | valid, session scope | working set |
//! | valid, anything else | ranked, top `k` |
//! | invalid with a successor | invalidated, most recently accessed first, capped |
//!
//! Invalid facts without a successor appear in no layer.

use chrono::{DateTime, Utc};

use crate::models::{ContextResult, Environment, Fact, FactKind, FactScope};
use crate::search::rank_facts;

/// Default cap on superseded facts shown for contrast.
pub const MAX_INVALIDATED_FACTS: usize = 3;

/// Body length shown for ranked valid facts, in characters.
pub const VALID_BODY_CHARS: usize = 200;

/// Body length shown for superseded, known-unknown, and session facts.
pub const SHORT_BODY_CHARS: usize = 150;

/// Inputs for one context assembly.
#[derive(Debug, Clone)]
pub struct ContextRequest<'a> {
    /// The query text.
    pub query: &'a str,
    /// Embedding of the query, if one could be computed.
    pub query_embedding: Option<&'a [f32]>,
    /// Passed through to the result untouched.
    pub environment: Environment,
    /// Maximum number of ranked valid facts.
    pub k: usize,
}

/// Builds [`ContextResult`]s and renders them for prompts.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    pub max_invalidated: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self {
            max_invalidated: MAX_INVALIDATED_FACTS,
        }
    }
}

impl ContextAssembler {
    pub fn new(max_invalidated: usize) -> Self {
        Self { max_invalidated }
    }

    /// Assemble layers from `facts` for the request, scoring at the current time.
    pub fn assemble(&self, facts: &[Fact], req: ContextRequest<'_>) -> ContextResult {
        self.assemble_at(facts, req, Utc::now())
    }

    /// Assemble layers, scoring recency relative to `now`.
    pub fn assemble_at(
        &self,
        facts: &[Fact],
        req: ContextRequest<'_>,
        now: DateTime<Utc>,
    ) -> ContextResult {
        let mut constraints: Vec<&Fact> = Vec::new();
        let mut known_unknowns: Vec<&Fact> = Vec::new();
        let mut working_set: Vec<&Fact> = Vec::new();
        let mut candidates: Vec<&Fact> = Vec::new();
        let mut invalidated: Vec<&Fact> = Vec::new();

        for fact in facts {
            if fact.is_valid {
                if fact.kind == FactKind::Constraint {
                    constraints.push(fact);
                } else if fact.kind == FactKind::KnownUnknown {
                    known_unknowns.push(fact);
                } else if fact.scope == FactScope::Session {
                    working_set.push(fact);
                } else {
                    candidates.push(fact);
                }
            } else if fact.superseded_by.is_some() {
                invalidated.push(fact);
            }
        }

        constraints.sort_by_key(|f| f.scope);

        let valid_facts: Vec<Fact> = rank_facts(candidates, req.query_embedding, now)
            .into_iter()
            .take(req.k)
            .map(|s| s.fact.clone())
            .collect();

        invalidated.sort_by(|a, b| b.metadata.last_accessed.cmp(&a.metadata.last_accessed));
        invalidated.truncate(self.max_invalidated);

        ContextResult {
            query: req.query.to_string(),
            constraints: constraints.into_iter().cloned().collect(),
            valid_facts,
            invalidated_facts: invalidated.into_iter().cloned().collect(),
            working_set: working_set.into_iter().cloned().collect(),
            environment: req.environment,
            known_unknowns: known_unknowns.into_iter().cloned().collect(),
        }
    }

    /// Render a context result for prompt injection.
    pub fn format_context_for_prompt(&self, ctx: &ContextResult) -> String {
        format_context_for_prompt(ctx)
    }
}

/// Render a [`ContextResult`] as markdown sections.
///
/// Sections appear in a fixed order and are omitted when empty; an empty
/// result renders to an empty string.
pub fn format_context_for_prompt(ctx: &ContextResult) -> String {
    let mut sections: Vec<String> = Vec::new();

    if !ctx.constraints.is_empty() {
        let mut lines = vec!["## Project Constraints".to_string()];
        for fact in &ctx.constraints {
            lines.push(format!("### {}", fact.subject));
            lines.push(fact.body.clone());
        }
        sections.push(lines.join("\n"));
    }

    if !ctx.valid_facts.is_empty() {
        let mut lines = vec!["## Relevant Knowledge".to_string()];
        for fact in &ctx.valid_facts {
            lines.push(format!(
                "- **{}** ({}, confidence={:.2}): {}",
                fact.subject,
                fact.kind,
                fact.metadata.confidence,
                truncate_chars(&fact.body, VALID_BODY_CHARS)
            ));
        }
        sections.push(lines.join("\n"));
    }

    if !ctx.invalidated_facts.is_empty() {
        let mut lines = vec!["## Recently Changed (for context)".to_string()];
        for fact in &ctx.invalidated_facts {
            lines.push(format!(
                "- ~~{}~~ (superseded): {}",
                fact.subject,
                truncate_chars(&fact.body, SHORT_BODY_CHARS)
            ));
        }
        sections.push(lines.join("\n"));
    }

    if !ctx.known_unknowns.is_empty() {
        let mut lines = vec!["## Known Unknowns".to_string()];
        for fact in &ctx.known_unknowns {
            lines.push(format!(
                "- {}: {}",
                fact.subject,
                truncate_chars(&fact.body, SHORT_BODY_CHARS)
            ));
        }
        sections.push(lines.join("\n"));
    }

    if !ctx.working_set.is_empty() {
        let mut lines = vec!["## Session Context".to_string()];
        for fact in &ctx.working_set {
            lines.push(format!(
                "- {}: {}",
                fact.subject,
                truncate_chars(&fact.body, SHORT_BODY_CHARS)
            ));
        }
        sections.push(lines.join("\n"));
    }

    sections.join("\n\n")
}

/// The first `max_chars` characters of `s`, on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(k: usize) -> ContextRequest<'static> {
        ContextRequest {
            query: "query",
            query_embedding: None,
            environment: Environment::new(),
            k,
        }
    }

    fn superseded(subject: &str, accessed: DateTime<Utc>) -> Fact {
        let mut f = Fact::new(subject, "old body", FactKind::Pattern, FactScope::Project);
        f.invalidate();
        f.superseded_by = Some("successor".to_string());
        f.metadata.last_accessed = accessed;
        f
    }

    #[test]
    fn test_layer_partitioning() {
        let facts = vec![
            Fact::new("rule", "b", FactKind::Constraint, FactScope::Project),
            Fact::new("gap", "b", FactKind::KnownUnknown, FactScope::Session),
            Fact::new("scratch", "b", FactKind::Decision, FactScope::Session),
            Fact::new("pattern", "b", FactKind::Pattern, FactScope::Project),
            superseded("old", Utc::now()),
        ];
        let ctx = ContextAssembler::default().assemble(&facts, request(5));

        assert_eq!(ctx.constraints.len(), 1);
        assert_eq!(ctx.known_unknowns.len(), 1);
        assert_eq!(ctx.known_unknowns[0].subject, "gap");
        assert_eq!(ctx.working_set.len(), 1);
        assert_eq!(ctx.working_set[0].subject, "scratch");
        assert_eq!(ctx.valid_facts.len(), 1);
        assert_eq!(ctx.invalidated_facts.len(), 1);
        assert_eq!(ctx.query, "query");
    }

    #[test]
    fn test_orphaned_tombstone_dropped() {
        let mut orphan = Fact::new("rule", "b", FactKind::Constraint, FactScope::Project);
        orphan.invalidate();
        let ctx = ContextAssembler::default().assemble(&[orphan], request(5));
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_constraints_sorted_by_scope_stable() {
        let facts = vec![
            Fact::new("p1", "b", FactKind::Constraint, FactScope::Project),
            Fact::new("s1", "b", FactKind::Constraint, FactScope::Session),
            Fact::new("g1", "b", FactKind::Constraint, FactScope::Global),
            Fact::new("p2", "b", FactKind::Constraint, FactScope::Project),
            Fact::new("o1", "b", FactKind::Constraint, FactScope::Org),
        ];
        let ctx = ContextAssembler::default().assemble(&facts, request(5));
        let order: Vec<&str> = ctx.constraints.iter().map(|f| f.subject.as_str()).collect();
        assert_eq!(order, vec!["g1", "o1", "p1", "p2", "s1"]);
    }

    #[test]
    fn test_invalidated_capped_most_recent_first() {
        let now = Utc::now();
        let facts: Vec<Fact> = (0..10)
            .map(|i| superseded(&format!("old-{}", i), now - Duration::hours(i)))
            .collect();
        let ctx = ContextAssembler::default().assemble(&facts, request(5));
        let subjects: Vec<&str> = ctx
            .invalidated_facts
            .iter()
            .map(|f| f.subject.as_str())
            .collect();
        assert_eq!(subjects, vec!["old-0", "old-1", "old-2"]);
    }

    #[test]
    fn test_valid_facts_truncated_to_k() {
        let facts: Vec<Fact> = (0..8)
            .map(|i| {
                Fact::new(format!("f{i}"), "b", FactKind::Pattern, FactScope::Project)
                    .with_confidence(0.1 * i as f64)
            })
            .collect();
        let ctx = ContextAssembler::default().assemble(&facts, request(3));
        let subjects: Vec<&str> = ctx.valid_facts.iter().map(|f| f.subject.as_str()).collect();
        assert_eq!(subjects, vec!["f7", "f6", "f5"]);
    }

    #[test]
    fn test_environment_passed_through() {
        let mut req = request(5);
        req.environment.insert("branch".to_string(), serde_json::json!("main"));
        let ctx = ContextAssembler::default().assemble(&[], req);
        assert_eq!(ctx.environment["branch"], "main");
    }

    #[test]
    fn test_format_empty_is_empty_string() {
        assert_eq!(format_context_for_prompt(&ContextResult::default()), "");
    }

    #[test]
    fn test_format_section_order_and_truncation() {
        let long_body = "x".repeat(500);
        let facts = vec![
            Fact::new(
                "Session note",
                long_body.clone(),
                FactKind::Decision,
                FactScope::Session,
            ),
            Fact::new(
                "Gap",
                long_body.clone(),
                FactKind::KnownUnknown,
                FactScope::Project,
            ),
            superseded("Old way", Utc::now()),
            Fact::new(
                "Use tracing",
                long_body.clone(),
                FactKind::Pattern,
                FactScope::Project,
            )
            .with_confidence(0.75),
            Fact::new(
                "No unsafe",
                "Never use unsafe.",
                FactKind::Constraint,
                FactScope::Global,
            ),
        ];
        let ctx = ContextAssembler::default().assemble(&facts, request(5));
        let out = format_context_for_prompt(&ctx);

        let positions: Vec<usize> = [
            "## Project Constraints",
            "## Relevant Knowledge",
            "## Recently Changed",
            "## Known Unknowns",
            "## Session Context",
        ]
        .iter()
        .map(|h| out.find(h).unwrap_or_else(|| panic!("missing {}", h)))
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        assert!(out.contains("### No unsafe\nNever use unsafe."));
        assert!(out.contains(&format!(
            "- **Use tracing** (pattern, confidence=0.75): {}\n",
            "x".repeat(200)
        )));
        assert!(out.contains(&format!("- Gap: {}\n", "x".repeat(150))));
        assert!(out.ends_with(&format!("- Session note: {}", "x".repeat(150))));
        assert!(out.contains("- ~~Old way~~ (superseded): old body"));
    }

    #[test]
    fn test_format_omits_empty_sections() {
        let only = Fact::new("Only", "one", FactKind::Pattern, FactScope::Project);
        let facts = vec![only];
        let ctx = ContextAssembler::default().assemble(&facts, request(5));
        let out = format_context_for_prompt(&ctx);
        assert!(out.starts_with("## Relevant Knowledge"));
        assert!(!out.contains("Constraints"));
        assert!(!out.contains("Session"));
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
