//! # Memory Harness CLI (`mem`)
//!
//! The `mem` binary records facts, searches them, and prints prompt context
//! for the codebase it is run from.
//!
//! ## Usage
//!
//! ```bash
//! mem --config ~/.neo/mem.toml --root . <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mem add <subject> <body>` | Record a fact (may supersede a similar one) |
//! | `mem search "<query>"` | Rank facts by relevance |
//! | `mem context "<query>"` | Print layered prompt context |
//! | `mem get <id>` | Show a fact and its supersession chain |
//! | `mem stats` | Summarize the store |
//! | `mem review` | List facts whose dependencies were superseded |
//!
//! ## Examples
//!
//! ```bash
//! # Record a project decision
//! mem add "Use sqlx" "All queries go through sqlx." --kind decision
//!
//! # A global preference with a dependency
//! mem add "Prefer query_as" "Map rows with query_as!" --scope global --depends-on 1a2b3c4d5e6f7a8b
//!
//! # Context for a prompt, with git state passed through
//! mem context "add a migration" --env branch=main --env dirty=true
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use memory_harness::config::{self, Config};
use memory_harness::store::{FactStore, NewFact};
use memory_harness::{add_cmd, context_cmd, get, search, stats};
use memory_harness_core::models::{FactKind, FactScope, DEFAULT_CONFIDENCE};

/// Memory Harness CLI: scoped, supersession-based fact memory for AI
/// assistants.
#[derive(Parser)]
#[command(
    name = "mem",
    about = "Memory Harness: scoped, supersession-based fact memory for AI assistants",
    version,
    long_about = "Memory Harness stores discrete facts (decisions, patterns, constraints, \
    failures) per global, org, and project scope, supersedes near-duplicates automatically, \
    and assembles layered markdown context for language-model prompts."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `~/.neo/mem.toml`. Built-in defaults are used when the
    /// file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Codebase root used for the project scope and constraint files.
    ///
    /// Defaults to the current directory.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Log debug output to stderr (overrides `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Record a fact.
    ///
    /// If a valid fact of the same scope and kind is more similar than the
    /// supersession threshold, it is invalidated and linked to the new one.
    Add {
        /// Short label.
        subject: String,

        /// Full content.
        body: String,

        /// constraint, architecture, pattern, review, decision, known_unknown, or failure.
        #[arg(long, default_value = "pattern")]
        kind: FactKind,

        /// global, org, project, or session.
        #[arg(long, default_value = "project")]
        scope: FactScope,

        /// Confidence in [0, 1]; out-of-range values are clamped.
        #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
        confidence: f64,

        /// Free-form tag (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Id of a fact this one assumes (repeatable).
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,

        /// File the fact came from.
        #[arg(long)]
        source_file: Option<String>,

        /// Prompt that produced the fact.
        #[arg(long)]
        source_prompt: Option<String>,
    },

    /// Rank valid, non-constraint facts for a query.
    ///
    /// Returned facts have their access statistics updated.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results (default: `retrieval.default_k`).
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Print layered prompt context for a query.
    Context {
        /// The query the context is for.
        query: String,

        /// Maximum number of ranked facts (default: `retrieval.default_k`).
        #[arg(short, long)]
        k: Option<usize>,

        /// Environment entry as `KEY=VALUE` (repeatable). JSON values keep their type.
        #[arg(long = "env", value_parser = parse_key_val)]
        env: Vec<(String, String)>,

        /// Print the assembled layers as JSON instead of markdown.
        #[arg(long)]
        json: bool,
    },

    /// Show a fact and its supersession chain.
    Get {
        /// Fact id.
        id: String,
    },

    /// Summarize the store.
    Stats,

    /// List valid facts whose dependencies were superseded.
    Review,
}

/// Parse a `key=value` pair for `--env` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".neo")
        .join("mem.toml")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let cfg: Config = config::load_config_or_default(&config_path)?;

    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let mut store = FactStore::open(&cfg, Some(&root))?;
    let default_k = cfg.retrieval.default_k;

    match cli.command {
        Commands::Add {
            subject,
            body,
            kind,
            scope,
            confidence,
            tags,
            depends_on,
            source_file,
            source_prompt,
        } => {
            let new = NewFact {
                subject,
                body,
                kind,
                scope,
                confidence,
                source_file: source_file.unwrap_or_default(),
                source_prompt: source_prompt.unwrap_or_default(),
                tags,
                depends_on,
            };
            add_cmd::run_add(&mut store, new)?;
        }
        Commands::Search { query, k } => {
            search::run_search(&mut store, &query, k.unwrap_or(default_k))?;
        }
        Commands::Context {
            query,
            k,
            env,
            json,
        } => {
            context_cmd::run_context(&mut store, &query, k.unwrap_or(default_k), env, json)?;
        }
        Commands::Get { id } => {
            get::run_get(&store, &id)?;
        }
        Commands::Stats => {
            stats::run_stats(&store)?;
        }
        Commands::Review => {
            stats::run_review(&store)?;
        }
    }

    Ok(())
}
