use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use memory_harness_core::models::FactScope;
use memory_harness_core::supersede::SUPERSESSION_THRESHOLD;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub constraints: ConstraintsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding the partition files.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Directory holding the legacy memory files.
    #[serde(default = "default_legacy_dir")]
    pub legacy_dir: PathBuf,
    /// Side file with constraint source checksums.
    #[serde(default = "default_checksum_path")]
    pub checksum_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            legacy_dir: default_legacy_dir(),
            checksum_path: default_checksum_path(),
        }
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_storage_root() -> PathBuf {
    home_dir().join(".neo").join("facts")
}
fn default_legacy_dir() -> PathBuf {
    home_dir().join(".neo")
}
fn default_checksum_path() -> PathBuf {
    home_dir()
        .join(".neo")
        .join("constraints")
        .join("checksums.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            max_text_chars: default_max_text_chars(),
            cache_size: default_cache_size(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_text_chars() -> usize {
    32_000
}
fn default_cache_size() -> usize {
    500
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_threshold")]
    pub supersession_threshold: f64,
    #[serde(default = "default_max_invalidated")]
    pub max_invalidated: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            supersession_threshold: default_threshold(),
            max_invalidated: default_max_invalidated(),
        }
    }
}

fn default_k() -> usize {
    5
}
fn default_threshold() -> f64 {
    SUPERSESSION_THRESHOLD
}
fn default_max_invalidated() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConstraintsConfig {
    #[serde(default = "default_auto_ingest")]
    pub auto_ingest: bool,
    /// Documentation files (or directories) to ingest, in order.
    #[serde(default = "default_constraint_sources")]
    pub sources: Vec<ConstraintSourceConfig>,
}

impl Default for ConstraintsConfig {
    fn default() -> Self {
        Self {
            auto_ingest: default_auto_ingest(),
            sources: default_constraint_sources(),
        }
    }
}

/// One path template and the scope its constraints get.
///
/// `~/` expands to the home directory and `{project}` to the codebase root.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ConstraintSourceConfig {
    pub path: String,
    pub scope: FactScope,
}

fn default_auto_ingest() -> bool {
    true
}

fn default_constraint_sources() -> Vec<ConstraintSourceConfig> {
    [
        ("~/.claude/CLAUDE.md", FactScope::Global),
        ("{project}/CLAUDE.md", FactScope::Project),
        ("{project}/agents.md", FactScope::Project),
        ("{project}/.cursor/rules", FactScope::Project),
    ]
    .into_iter()
    .map(|(path, scope)| ConstraintSourceConfig {
        path: path.to_string(),
        scope,
    })
    .collect()
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Config::default()
    }

    fn expand_paths(mut self) -> Self {
        self.storage.root = expand_home(&self.storage.root);
        self.storage.legacy_dir = expand_home(&self.storage.legacy_dir);
        self.storage.checksum_path = expand_home(&self.storage.checksum_path);
        self
    }
}

/// Load the config file, or defaults when `path` does not exist.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    let config = config.expand_paths();

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate retrieval
    if config.retrieval.default_k < 1 {
        anyhow::bail!("retrieval.default_k must be >= 1");
    }
    let threshold = config.retrieval.supersession_threshold;
    if !(threshold > 0.0 && threshold <= 1.0) {
        anyhow::bail!("retrieval.supersession_threshold must be in (0.0, 1.0]");
    }

    // Validate embedding
    if config.embedding.cache_size == 0 {
        anyhow::bail!("embedding.cache_size must be > 0");
    }
    if config.embedding.max_text_chars == 0 {
        anyhow::bail!("embedding.max_text_chars must be > 0");
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0 when set");
    }

    match config.embedding.provider.as_str() {
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        "disabled" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mem.toml");
        fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let (_tmp, path) = write_config("");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.embedding.provider, "disabled");
        assert_eq!(cfg.embedding.cache_size, 500);
        assert_eq!(cfg.retrieval.supersession_threshold, 0.85);
        assert_eq!(cfg.retrieval.default_k, 5);
        assert!(cfg.constraints.auto_ingest);
        assert_eq!(cfg.constraints.sources.len(), 4);
        assert_eq!(cfg.constraints.sources[0].scope, FactScope::Global);
        assert!(cfg.storage.root.ends_with(".neo/facts"));
    }

    #[test]
    fn test_full_config() {
        let (_tmp, path) = write_config(
            r#"
[storage]
root = "/tmp/facts"

[embedding]
provider = "ollama"
model = "nomic-embed-text"
dims = 768

[retrieval]
supersession_threshold = 0.9

[constraints]
auto_ingest = false
sources = [{ path = "{project}/RULES.md", scope = "org" }]
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.storage.root, PathBuf::from("/tmp/facts"));
        assert_eq!(cfg.embedding.dims, Some(768));
        assert_eq!(cfg.retrieval.supersession_threshold, 0.9);
        assert!(!cfg.constraints.auto_ingest);
        assert_eq!(
            cfg.constraints.sources,
            vec![ConstraintSourceConfig {
                path: "{project}/RULES.md".to_string(),
                scope: FactScope::Org,
            }]
        );
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let (_tmp, path) = write_config("[retrieval]\nsupersession_threshold = 1.5\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let (_tmp, path) = write_config("[embedding]\nprovider = \"magic\"\n");
        let err = load_config(&path).unwrap_err().to_string();
        assert!(err.contains("Unknown embedding provider"));
    }

    #[test]
    fn test_openai_requires_model() {
        let (_tmp, path) = write_config("[embedding]\nprovider = \"openai\"\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = load_config_or_default(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.embedding.provider, "disabled");
    }

    #[test]
    fn test_expand_home() {
        let expanded = expand_home(Path::new("~/.claude/CLAUDE.md"));
        assert!(!expanded.starts_with("~"));
        assert!(expanded.ends_with(".claude/CLAUDE.md"));
        assert_eq!(expand_home(Path::new("/abs/x")), PathBuf::from("/abs/x"));
    }
}
