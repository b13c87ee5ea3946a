//! Conversion of legacy reasoning-memory entries into facts.
//!
//! The previous memory format stored `{ "entries": [...] }` records keyed by
//! a free-form `pattern`. This module converts one such record into a
//! [`Fact`]; reading the legacy files is the app crate's job.

use serde::Deserialize;

use crate::embedding::is_usable_vector;
use crate::models::{
    from_epoch_seconds, Fact, FactKind, FactScope, ScopeIdentity, DEFAULT_CONFIDENCE,
};

/// Maximum subject length, in characters.
const SUBJECT_MAX_CHARS: usize = 100;

/// Pattern prefix → kind, checked in order.
const KIND_PREFIXES: [(&str, FactKind); 6] = [
    ("feature", FactKind::Decision),
    ("bugfix", FactKind::Failure),
    ("refactor", FactKind::Architecture),
    ("algorithm", FactKind::Pattern),
    ("explanation", FactKind::Pattern),
    ("parse_failure", FactKind::Failure),
];

/// A legacy memory record. Every field is optional and may be `null`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LegacyEntry {
    pub pattern: Option<String>,
    pub reasoning: Option<String>,
    pub suggestion: Option<String>,
    pub code_template: Option<String>,
    pub code_skeleton: Option<String>,
    pub common_pitfalls: serde_json::Value,
    pub when_to_use: Option<String>,
    pub algorithm_type: Option<String>,
    pub algorithm_category: Option<String>,
    pub embedding: serde_json::Value,
    pub confidence: Option<f64>,
    pub created_at: Option<f64>,
    pub last_used: Option<f64>,
    pub use_count: Option<u64>,
    pub context: Option<String>,
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Infer a fact kind from the legacy pattern prefix (case-insensitive).
pub fn infer_kind(pattern: &str) -> FactKind {
    let lower = pattern.to_lowercase();
    KIND_PREFIXES
        .iter()
        .find(|(prefix, _)| lower.starts_with(prefix))
        .map(|(_, kind)| *kind)
        .unwrap_or(FactKind::Pattern)
}

/// Convert a legacy entry into a fact in `scope`.
///
/// Returns `None` for entries without a pattern. Embeddings are kept only
/// when they are a non-empty array of finite numbers.
pub fn convert_legacy_entry(
    entry: &LegacyEntry,
    scope: FactScope,
    identity: &ScopeIdentity,
) -> Option<Fact> {
    let pattern = non_empty(&entry.pattern)?;

    let subject: String = pattern.chars().take(SUBJECT_MAX_CHARS).collect();

    let mut body_parts: Vec<String> = Vec::new();
    if let Some(reasoning) = non_empty(&entry.reasoning) {
        body_parts.push(format!("Reasoning: {}", reasoning));
    }
    if let Some(suggestion) = non_empty(&entry.suggestion) {
        body_parts.push(format!("Suggestion: {}", suggestion));
    }
    if let Some(template) = non_empty(&entry.code_template) {
        body_parts.push(format!("Code template: {}", template));
    }
    if let Some(skeleton) = non_empty(&entry.code_skeleton) {
        body_parts.push(format!("Code skeleton: {}", skeleton));
    }
    if let Some(pitfalls) = entry.common_pitfalls.as_array() {
        let items: Vec<&str> = pitfalls.iter().filter_map(|p| p.as_str()).collect();
        if !items.is_empty() {
            body_parts.push(format!("Pitfalls: {}", items.join("; ")));
        }
    }
    if let Some(when) = non_empty(&entry.when_to_use) {
        body_parts.push(format!("When to use: {}", when));
    }
    let body = if body_parts.is_empty() {
        pattern.to_string()
    } else {
        body_parts.join("\n")
    };

    let mut tags = vec!["migrated".to_string()];
    tags.extend(non_empty(&entry.algorithm_type).map(str::to_string));
    tags.extend(non_empty(&entry.algorithm_category).map(str::to_string));

    let embedding = parse_embedding(&entry.embedding);

    let mut fact = Fact::new(subject, body, infer_kind(pattern), scope)
        .with_identity(identity)
        .with_confidence(entry.confidence.unwrap_or(DEFAULT_CONFIDENCE))
        .with_tags(tags)
        .with_embedding(embedding);
    fact.metadata.created_at = from_epoch_seconds(entry.created_at.unwrap_or(0.0));
    fact.metadata.last_accessed = from_epoch_seconds(entry.last_used.unwrap_or(0.0));
    fact.metadata.access_count = entry.use_count.unwrap_or(0);
    fact.metadata.source_prompt = entry.context.clone().unwrap_or_default();

    Some(fact)
}

fn parse_embedding(value: &serde_json::Value) -> Option<Vec<f32>> {
    let items = value.as_array()?;
    let vec: Option<Vec<f32>> = items.iter().map(|v| v.as_f64().map(|x| x as f32)).collect();
    vec.filter(|v| is_usable_vector(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(value: serde_json::Value) -> LegacyEntry {
        serde_json::from_value(value).unwrap()
    }

    fn identity() -> ScopeIdentity {
        ScopeIdentity::new("acme", "abcdef0123456789")
    }

    #[test]
    fn test_kind_inference() {
        assert_eq!(infer_kind("feature: add login"), FactKind::Decision);
        assert_eq!(infer_kind("BugFix: off by one"), FactKind::Failure);
        assert_eq!(infer_kind("refactor the parser"), FactKind::Architecture);
        assert_eq!(infer_kind("parse_failure in json"), FactKind::Failure);
        assert_eq!(infer_kind("something else"), FactKind::Pattern);
    }

    #[test]
    fn test_empty_pattern_skipped() {
        let e = entry(json!({"reasoning": "x"}));
        assert!(convert_legacy_entry(&e, FactScope::Global, &identity()).is_none());
    }

    #[test]
    fn test_full_conversion() {
        let e = entry(json!({
            "pattern": "bugfix: null deref in handler",
            "reasoning": "Handler assumed a session",
            "suggestion": "Check the session first",
            "common_pitfalls": ["forgetting logout", "stale cache"],
            "algorithm_type": "guard",
            "confidence": 1.4,
            "created_at": 1700000000.5,
            "last_used": 1700000100.0,
            "use_count": 4,
            "context": "fix the crash",
            "embedding": [0.1, 0.2, 0.3]
        }));
        let fact = convert_legacy_entry(&e, FactScope::Project, &identity()).unwrap();

        assert_eq!(fact.kind, FactKind::Failure);
        assert_eq!(fact.scope, FactScope::Project);
        assert_eq!(fact.subject, "bugfix: null deref in handler");
        assert_eq!(
            fact.body,
            "Reasoning: Handler assumed a session\nSuggestion: Check the session first\n\
             Pitfalls: forgetting logout; stale cache"
        );
        assert_eq!(fact.tags, vec!["migrated", "guard"]);
        assert_eq!(fact.metadata.confidence, 1.0);
        assert_eq!(fact.metadata.access_count, 4);
        assert_eq!(fact.metadata.created_at.timestamp(), 1_700_000_000);
        assert_eq!(fact.metadata.source_prompt, "fix the crash");
        assert_eq!(fact.embedding.as_ref().map(|v| v.len()), Some(3));
        assert_eq!(fact.org_id, "acme");
    }

    #[test]
    fn test_body_falls_back_to_pattern() {
        let e = entry(json!({"pattern": "explanation of X"}));
        let fact = convert_legacy_entry(&e, FactScope::Global, &identity()).unwrap();
        assert_eq!(fact.body, "explanation of X");
        assert_eq!(fact.metadata.created_at.timestamp(), 0);
    }

    #[test]
    fn test_bad_embedding_dropped() {
        let fact = convert_legacy_entry(
            &entry(json!({"pattern": "p", "embedding": [0.1, "oops"]})),
            FactScope::Global,
            &identity(),
        )
        .unwrap();
        assert!(fact.embedding.is_none());
    }

    #[test]
    fn test_null_fields_tolerated() {
        let e = entry(json!({"pattern": "feature: x", "reasoning": null, "context": null}));
        let fact = convert_legacy_entry(&e, FactScope::Global, &identity()).unwrap();
        assert_eq!(fact.body, "feature: x");
        assert_eq!(fact.kind, FactKind::Decision);
    }

    #[test]
    fn test_long_pattern_truncated() {
        let pattern = "é".repeat(150);
        let e = entry(json!({ "pattern": pattern }));
        let fact = convert_legacy_entry(&e, FactScope::Global, &identity()).unwrap();
        assert_eq!(fact.subject.chars().count(), 100);
    }
}
