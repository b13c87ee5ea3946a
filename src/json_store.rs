//! JSON-file partition storage.
//!
//! Each [`Partition`] maps to one file under the storage root:
//!
//! | Partition | File |
//! |-----------|------|
//! | `Global` | `facts_global.json` |
//! | `Org(id)` | `facts_org_<id>.json` |
//! | `Project(id)` | `facts_project_<id>.json` |
//!
//! Files hold `{"version": "2.0", "facts": [...]}` and are always replaced
//! atomically (write `<file>.tmp`, then rename).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use memory_harness_core::models::Fact;
use memory_harness_core::store::{FactRepository, Partition};

/// Format version written to every partition file.
pub const FORMAT_VERSION: &str = "2.0";

#[derive(Serialize)]
struct PartitionFileOut<'a> {
    version: &'a str,
    facts: &'a [&'a Fact],
}

#[derive(Deserialize)]
struct PartitionFileIn {
    #[serde(default)]
    facts: Vec<serde_json::Value>,
}

/// Stores partitions as pretty-printed JSON files in one directory.
pub struct JsonFileRepository {
    root: PathBuf,
    dims: Option<usize>,
}

impl JsonFileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dims: None,
        }
    }

    /// Discard loaded embeddings whose length differs from `dims`.
    pub fn with_dims(mut self, dims: Option<usize>) -> Self {
        self.dims = dims;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partition_path(&self, partition: &Partition) -> PathBuf {
        let name = match partition {
            Partition::Global => "facts_global.json".to_string(),
            Partition::Org(id) => format!("facts_org_{}.json", id),
            Partition::Project(id) => format!("facts_project_{}.json", id),
        };
        self.root.join(name)
    }
}

impl FactRepository for JsonFileRepository {
    fn load_partition(&self, partition: &Partition) -> Result<Vec<Fact>> {
        let path = self.partition_path(partition);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file: PartitionFileIn = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let mut facts = Vec::with_capacity(file.facts.len());
        for (idx, record) in file.facts.into_iter().enumerate() {
            match serde_json::from_value::<Fact>(record) {
                Ok(fact) => facts.push(fact),
                Err(e) => warn!("skipping record {} in {}: {}", idx, path.display(), e),
            }
        }

        if let Some(dims) = self.dims {
            for fact in facts.iter_mut() {
                if fact.embedding.as_ref().is_some_and(|e| e.len() != dims) {
                    warn!(
                        "dropping embedding of fact {}: expected {} dimensions",
                        fact.id, dims
                    );
                    fact.embedding = None;
                }
            }
        }

        debug!("loaded {} facts from {}", facts.len(), path.display());
        Ok(facts)
    }

    fn save_partition(&self, partition: &Partition, facts: &[&Fact]) -> Result<()> {
        let path = self.partition_path(partition);
        let file = PartitionFileOut {
            version: FORMAT_VERSION,
            facts,
        };
        let json = serde_json::to_string_pretty(&file)?;
        write_atomic(&path, json.as_bytes())?;
        debug!("saved {} facts to {}", facts.len(), path.display());
        Ok(())
    }
}

/// Write `bytes` to `<path>.tmp` and rename it over `path`, creating the
/// parent directory first.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
