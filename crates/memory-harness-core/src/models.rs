//! Core data models for the fact memory.
//!
//! A [`Fact`] is the unit of knowledge: a subject/body pair tagged with a
//! [`FactKind`] and a [`FactScope`], carrying validity, supersession links,
//! dependency ids, access metadata, and an optional embedding vector.
//!
//! The serde representation of these types is the on-disk format of the
//! partition files. Missing fields fall back to the same defaults a freshly
//! constructed fact would get, so older or hand-edited files still load.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Org id used when the version-control remote cannot be parsed.
pub const UNKNOWN_ORG: &str = "unknown";

/// Confidence assigned when none is given.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Type of knowledge a fact records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    /// Project rules, usually ingested from documentation files.
    Constraint,
    Architecture,
    #[default]
    Pattern,
    Review,
    Decision,
    /// An explicit gap in knowledge.
    KnownUnknown,
    /// A failed approach and why it failed.
    Failure,
}

impl FactKind {
    pub const ALL: [FactKind; 7] = [
        FactKind::Constraint,
        FactKind::Architecture,
        FactKind::Pattern,
        FactKind::Review,
        FactKind::Decision,
        FactKind::KnownUnknown,
        FactKind::Failure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactKind::Constraint => "constraint",
            FactKind::Architecture => "architecture",
            FactKind::Pattern => "pattern",
            FactKind::Review => "review",
            FactKind::Decision => "decision",
            FactKind::KnownUnknown => "known_unknown",
            FactKind::Failure => "failure",
        }
    }
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match FactKind::ALL.iter().find(|k| k.as_str() == normalized) {
            Some(kind) => Ok(*kind),
            None => bail!(
                "Unknown fact kind: '{}'. Must be one of constraint, architecture, pattern, \
                 review, decision, known_unknown, failure.",
                s
            ),
        }
    }
}

/// Visibility tier of a fact.
///
/// The declaration order is the display precedence used when rendering
/// constraints: `Global < Org < Project < Session`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FactScope {
    /// Cross-project knowledge (language idioms, personal preferences).
    Global,
    /// Organization-wide conventions.
    Org,
    #[default]
    Project,
    /// Current working session only.
    Session,
}

impl FactScope {
    pub const ALL: [FactScope; 4] = [
        FactScope::Global,
        FactScope::Org,
        FactScope::Project,
        FactScope::Session,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactScope::Global => "global",
            FactScope::Org => "org",
            FactScope::Project => "project",
            FactScope::Session => "session",
        }
    }
}

impl fmt::Display for FactScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        match FactScope::ALL.iter().find(|k| k.as_str() == normalized) {
            Some(scope) => Ok(*scope),
            None => bail!(
                "Unknown fact scope: '{}'. Must be global, org, project, or session.",
                s
            ),
        }
    }
}

/// The resolved (org, project) identity a store operates under.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScopeIdentity {
    /// Organization parsed from the version-control remote, or [`UNKNOWN_ORG`].
    pub org_id: String,
    /// First 16 hex chars of SHA-256 of the codebase root; empty if none.
    pub project_id: String,
}

impl ScopeIdentity {
    pub fn new(org_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            project_id: project_id.into(),
        }
    }

    /// Whether an org was detected (an org partition exists).
    pub fn has_org(&self) -> bool {
        !self.org_id.is_empty() && self.org_id != UNKNOWN_ORG
    }

    /// Whether a project root was given (a project partition exists).
    pub fn has_project(&self) -> bool {
        !self.project_id.is_empty()
    }
}

/// Current time at the precision facts are persisted with.
///
/// Timestamps are stored as floating-point Unix seconds; truncating to
/// microseconds keeps a save/load cycle exact.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Convert floating-point Unix seconds to a timestamp.
///
/// Non-finite or out-of-range values map to the current time.
pub fn from_epoch_seconds(secs: f64) -> DateTime<Utc> {
    if !secs.is_finite() {
        return now();
    }
    DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64).unwrap_or_else(now)
}

/// Convert a timestamp to floating-point Unix seconds.
pub fn to_epoch_seconds(ts: &DateTime<Utc>) -> f64 {
    ts.timestamp_micros() as f64 / 1_000_000.0
}

/// Clamp a confidence value into `[0.0, 1.0]`; NaN becomes the default.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        DEFAULT_CONFIDENCE
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Generate a new opaque fact id (16 hex chars).
pub fn new_fact_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

mod epoch_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(super::to_epoch_seconds(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(super::from_epoch_seconds(secs))
    }
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

fn default_true() -> bool {
    true
}

fn deserialize_confidence<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let value = Option::<f64>::deserialize(d)?;
    Ok(value.map(clamp_confidence).unwrap_or(DEFAULT_CONFIDENCE))
}

/// Accept `null`, a missing key, or an array of floats. Empty or
/// non-finite vectors are discarded rather than rejected.
fn deserialize_embedding<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<f32>>, D::Error> {
    let value = Option::<Vec<f32>>::deserialize(d)?;
    Ok(value.filter(|v| !v.is_empty() && v.iter().all(|x| x.is_finite())))
}

/// Bookkeeping attached to every fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactMetadata {
    #[serde(with = "epoch_seconds", default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "epoch_seconds", default = "now")]
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
    /// File that produced this fact (constraint ingestion sets this).
    #[serde(default)]
    pub source_file: String,
    /// Prompt that triggered this fact.
    #[serde(default)]
    pub source_prompt: String,
    /// Always within `[0.0, 1.0]`.
    #[serde(
        default = "default_confidence",
        deserialize_with = "deserialize_confidence"
    )]
    pub confidence: f64,
}

impl Default for FactMetadata {
    fn default() -> Self {
        let ts = now();
        Self {
            created_at: ts,
            last_accessed: ts,
            access_count: 0,
            source_file: String::new(),
            source_prompt: String::new(),
            confidence: DEFAULT_CONFIDENCE,
        }
    }
}

impl FactMetadata {
    /// Record one retrieval of the fact.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_accessed = at;
        self.access_count = self.access_count.saturating_add(1);
    }
}

/// A single stored unit of knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    #[serde(default = "new_fact_id")]
    pub id: String,
    /// Concise label.
    #[serde(default)]
    pub subject: String,
    /// Full content.
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub kind: FactKind,
    #[serde(default)]
    pub scope: FactScope,
    #[serde(default)]
    pub org_id: String,
    #[serde(default)]
    pub project_id: String,
    /// Starts true and flips to false at most once.
    #[serde(default = "default_true")]
    pub is_valid: bool,
    #[serde(default)]
    pub superseded_by: Option<String>,
    #[serde(default)]
    pub supersedes: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Set when a dependency was superseded; never cleared automatically.
    #[serde(default)]
    pub needs_review: bool,
    #[serde(default)]
    pub metadata: FactMetadata,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_embedding"
    )]
    pub embedding: Option<Vec<f32>>,
}

impl Fact {
    /// Create a valid fact with a fresh id and default metadata.
    pub fn new(
        subject: impl Into<String>,
        body: impl Into<String>,
        kind: FactKind,
        scope: FactScope,
    ) -> Self {
        Self {
            id: new_fact_id(),
            subject: subject.into(),
            body: body.into(),
            kind,
            scope,
            org_id: String::new(),
            project_id: String::new(),
            is_valid: true,
            superseded_by: None,
            supersedes: None,
            depends_on: Vec::new(),
            needs_review: false,
            metadata: FactMetadata::default(),
            tags: Vec::new(),
            embedding: None,
        }
    }

    pub fn with_identity(mut self, identity: &ScopeIdentity) -> Self {
        self.org_id = identity.org_id.clone();
        self.project_id = identity.project_id.clone();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.set_confidence(confidence);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_embedding(mut self, embedding: Option<Vec<f32>>) -> Self {
        self.embedding = embedding;
        self
    }

    /// Set confidence, clamped to `[0.0, 1.0]`.
    pub fn set_confidence(&mut self, confidence: f64) {
        self.metadata.confidence = clamp_confidence(confidence);
    }

    /// Tombstone the fact. Idempotent; validity never returns.
    pub fn invalidate(&mut self) {
        self.is_valid = false;
    }

    /// Whether this fact was replaced by a newer one.
    pub fn is_superseded(&self) -> bool {
        !self.is_valid && self.superseded_by.is_some()
    }

    /// Text the embedding is computed from.
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.subject, self.body)
    }
}

/// Pass-through environment map (git state and the like).
pub type Environment = BTreeMap<String, serde_json::Value>;

/// Facts assembled into presentation layers for one query.
///
/// Built fresh on every assembly; holds copies, never live references.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextResult {
    /// The query this context was assembled for.
    pub query: String,
    /// Valid constraints, ordered global → org → project → session.
    pub constraints: Vec<Fact>,
    /// Top-ranked valid facts.
    pub valid_facts: Vec<Fact>,
    /// Recently superseded facts, for contrast.
    pub invalidated_facts: Vec<Fact>,
    /// Session-scoped facts.
    pub working_set: Vec<Fact>,
    pub environment: Environment,
    pub known_unknowns: Vec<Fact>,
}

impl ContextResult {
    /// True when no fact layer has content. The environment is ignored.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
            && self.valid_facts.is_empty()
            && self.invalidated_facts.is_empty()
            && self.working_set.is_empty()
            && self.known_unknowns.is_empty()
    }
}
