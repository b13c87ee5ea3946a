//! One-time import of the legacy reasoning-memory files.
//!
//! Reads `global_memory.json` (global scope) and `local_<project_id>.json`
//! (project scope) from the legacy directory. The files are only read,
//! never modified or removed.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use memory_harness_core::legacy::{convert_legacy_entry, LegacyEntry};
use memory_harness_core::models::{Fact, FactScope, ScopeIdentity};

#[derive(Deserialize)]
struct LegacyFile {
    #[serde(default)]
    entries: Vec<serde_json::Value>,
}

/// Legacy files for an identity, with the scope their entries get.
pub fn legacy_files(legacy_dir: &Path, identity: &ScopeIdentity) -> Vec<(PathBuf, FactScope)> {
    let mut files = vec![(legacy_dir.join("global_memory.json"), FactScope::Global)];
    if identity.has_project() {
        files.push((
            legacy_dir.join(format!("local_{}.json", identity.project_id)),
            FactScope::Project,
        ));
    }
    files
}

/// Whether any legacy file exists for the identity.
pub fn has_legacy_files(legacy_dir: &Path, identity: &ScopeIdentity) -> bool {
    legacy_files(legacy_dir, identity)
        .iter()
        .any(|(path, _)| path.exists())
}

/// Convert every legacy entry for the identity into facts.
///
/// Unreadable files and malformed or empty entries are logged and skipped.
pub fn migrate_from_legacy(legacy_dir: &Path, identity: &ScopeIdentity) -> Vec<Fact> {
    let mut migrated = Vec::new();

    for (path, scope) in legacy_files(legacy_dir, identity) {
        if !path.exists() {
            continue;
        }
        let entries = match read_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("skipping legacy file: {:#}", e);
                continue;
            }
        };

        let mut skipped = 0usize;
        for value in entries {
            let fact = serde_json::from_value::<LegacyEntry>(value)
                .ok()
                .and_then(|entry| convert_legacy_entry(&entry, scope, identity));
            match fact {
                Some(fact) => migrated.push(fact),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!("skipped {} unusable entries in {}", skipped, path.display());
        }
    }

    info!("migration: converted {} entries from legacy format", migrated.len());
    migrated
}

fn read_entries(path: &Path) -> Result<Vec<serde_json::Value>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file: LegacyFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(file.entries)
}
