//! Constraint ingestion from project documentation.
//!
//! Scans documentation files (`CLAUDE.md`, `agents.md`, `.cursor/rules/`)
//! and turns every markdown section into a `constraint` fact. A side file
//! of SHA-256 checksums, keyed by absolute path, makes re-runs over
//! unchanged files a no-op.
//!
//! When a file changes, the valid constraints previously ingested from it
//! are invalidated without a successor link and fresh facts are emitted
//! for its current sections.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use memory_harness_core::models::{Fact, FactKind, FactScope, ScopeIdentity};

use crate::config::{expand_home, ConstraintSourceConfig};
use crate::json_store::write_atomic;

const PROJECT_PLACEHOLDER: &str = "{project}";

/// Tags attached to every ingested constraint.
pub const CONSTRAINT_TAGS: [&str; 2] = ["constraint", "auto-ingested"];

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,3}\s+(.+)$").expect("valid heading regex"));

/// Outcome of one ingestion pass.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Constraint facts to append to the store.
    pub new_facts: Vec<Fact>,
    /// Ids of constraints invalidated because their file changed.
    pub superseded_ids: Vec<String>,
}

impl IngestReport {
    pub fn is_empty(&self) -> bool {
        self.new_facts.is_empty() && self.superseded_ids.is_empty()
    }
}

/// Converts documentation files into constraint facts, idempotently.
pub struct ConstraintIngester {
    sources: Vec<ConstraintSourceConfig>,
    codebase_root: Option<PathBuf>,
    identity: ScopeIdentity,
    checksum_path: PathBuf,
    checksums: BTreeMap<String, String>,
}

impl ConstraintIngester {
    /// Create an ingester, loading stored checksums from `checksum_path`.
    ///
    /// A missing or unreadable checksum file starts from an empty map.
    pub fn new(
        sources: Vec<ConstraintSourceConfig>,
        codebase_root: Option<&Path>,
        identity: ScopeIdentity,
        checksum_path: impl Into<PathBuf>,
    ) -> Self {
        let checksum_path = checksum_path.into();
        let checksums = load_checksums(&checksum_path);
        Self {
            sources,
            codebase_root: codebase_root.map(Path::to_path_buf),
            identity,
            checksum_path,
            checksums,
        }
    }

    /// Scan every source and return new constraints.
    ///
    /// Valid constraints in `existing` whose `source_file` is a changed
    /// file are invalidated in place. Unreadable files are logged and
    /// skipped. Updated checksums stay in memory until
    /// [`save_checksums`](Self::save_checksums) is called, which the
    /// caller does only after the resulting facts are persisted.
    pub fn ingest(&mut self, existing: &mut [Fact]) -> IngestReport {
        let mut report = IngestReport::default();

        for source in self.sources.clone() {
            let Some(path) = self.resolve(&source.path) else {
                debug!("skipping {}: no codebase root", source.path);
                continue;
            };
            for file in expand_source(&path) {
                self.ingest_file(&file, source.scope, existing, &mut report);
            }
        }

        if !report.is_empty() {
            info!(
                "ingested {} constraints, invalidated {}",
                report.new_facts.len(),
                report.superseded_ids.len()
            );
        }
        report
    }

    /// Resolve a path template; `None` when it needs a missing project root.
    fn resolve(&self, template: &str) -> Option<PathBuf> {
        let resolved = if template.contains(PROJECT_PLACEHOLDER) {
            let root = self.codebase_root.as_ref()?;
            template.replace(PROJECT_PLACEHOLDER, &root.to_string_lossy())
        } else {
            template.to_string()
        };
        Some(expand_home(Path::new(&resolved)))
    }

    fn ingest_file(
        &mut self,
        path: &Path,
        scope: FactScope,
        existing: &mut [Fact],
        report: &mut IngestReport,
    ) {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to read {}: {}", path.display(), e);
                return;
            }
        };
        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(e) => {
                warn!("{} is not valid UTF-8: {}", path.display(), e);
                return;
            }
        };

        let key = source_key(path);
        let checksum = hex::encode(Sha256::digest(content.as_bytes()));
        if self.checksums.get(&key) == Some(&checksum) {
            debug!("constraint file unchanged: {}", key);
            return;
        }

        info!("ingesting constraints from {}", key);

        for fact in existing.iter_mut() {
            if fact.kind == FactKind::Constraint
                && fact.is_valid
                && fact.metadata.source_file == key
            {
                fact.invalidate();
                report.superseded_ids.push(fact.id.clone());
            }
        }

        let default_heading = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| key.clone());

        for (heading, body) in split_markdown(&content, &default_heading) {
            let body = body.trim();
            if body.is_empty() {
                continue;
            }
            let mut fact = Fact::new(heading, body, FactKind::Constraint, scope)
                .with_identity(&self.identity)
                .with_confidence(1.0)
                .with_tags(CONSTRAINT_TAGS.iter().map(|t| t.to_string()).collect());
            fact.metadata.source_file = key.clone();
            report.new_facts.push(fact);
        }

        self.checksums.insert(key, checksum);
    }

    /// Write the checksum side file atomically.
    pub fn save_checksums(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.checksums)?;
        write_atomic(&self.checksum_path, json.as_bytes())
            .with_context(|| "Failed to save constraint checksums")
    }
}

/// Split markdown into `(heading, body)` sections at level 1-3 headings.
///
/// Text before the first heading belongs to `default_heading`. Sections
/// with no body lines are omitted; bodies are returned untrimmed.
pub fn split_markdown(content: &str, default_heading: &str) -> Vec<(String, String)> {
    let mut sections = Vec::new();
    let mut heading = default_heading.to_string();
    let mut body: Vec<&str> = Vec::new();

    for line in content.lines() {
        let captured = HEADING
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string());

        match captured {
            Some(next) => {
                if !body.is_empty() {
                    sections.push((heading, body.join("\n")));
                }
                heading = next;
                body = Vec::new();
            }
            None => body.push(line),
        }
    }
    if !body.is_empty() {
        sections.push((heading, body.join("\n")));
    }
    sections
}

/// Files to ingest for a resolved source path.
///
/// A regular file yields itself; a directory yields its `*.md` and
/// `*.mdc` files in path order; anything else yields nothing.
fn expand_source(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    if !path.is_dir() {
        return Vec::new();
    }

    let Some(rules) = rule_globset() else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("failed to walk {}: {}", path.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| rules.is_match(entry.file_name()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

fn rule_globset() -> Option<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in ["*.md", "*.mdc"] {
        builder.add(Glob::new(pattern).ok()?);
    }
    builder.build().ok()
}

/// Absolute path string used for checksums and `source_file`.
fn source_key(path: &Path) -> String {
    fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_string()
}

fn load_checksums(path: &Path) -> BTreeMap<String, String> {
    let Ok(content) = fs::read_to_string(path) else {
        return BTreeMap::new();
    };
    match serde_json::from_str(&content) {
        Ok(map) => map,
        Err(e) => {
            warn!("ignoring unreadable checksum file {}: {}", path.display(), e);
            BTreeMap::new()
        }
    }
}
