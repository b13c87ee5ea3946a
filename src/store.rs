//! The fact store: the single owner of facts for one scope identity.
//!
//! [`FactStore`] keeps every loaded fact in memory, applies supersession
//! when facts are added, ranks facts for retrieval, delegates context
//! assembly, and rewrites the scope partitions after every mutation.
//!
//! # Initialization
//!
//! [`FactStore::open`] runs the full startup sequence:
//!
//! 1. Resolve the (org, project) identity from the codebase root.
//! 2. Create the storage root.
//! 3. Build the embedding provider, falling back to a disabled one.
//! 4. Load the global, org, and project partitions.
//! 5. Import legacy memory files if the store holds no non-constraint facts.
//! 6. Ingest constraint documentation (unless `auto_ingest = false`).
//!
//! Only persistence write failures abort construction.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, error, info, warn};

use memory_harness_core::context::{ContextAssembler, ContextRequest};
use memory_harness_core::models::{
    self, ContextResult, Environment, Fact, FactKind, FactScope, ScopeIdentity, DEFAULT_CONFIDENCE,
};
use memory_harness_core::search::rank_facts;
use memory_harness_core::store::{FactRepository, Partition};
use memory_harness_core::supersede::{self, SUPERSESSION_THRESHOLD};

use crate::config::Config;
use crate::constraints::{ConstraintIngester, IngestReport};
use crate::embedding::{create_provider, CachedEmbedder, DisabledProvider, EmbeddingProvider};
use crate::json_store::JsonFileRepository;
use crate::migrate;
use crate::scope::detect_org_and_project;

/// Valid-fact count at which [`FactStore::memory_level`] reaches 0.5.
const MEMORY_LEVEL_REFERENCE: f64 = 50.0;

/// Tunables for a store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub supersession_threshold: f64,
    pub max_invalidated: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            supersession_threshold: SUPERSESSION_THRESHOLD,
            max_invalidated: memory_harness_core::context::MAX_INVALIDATED_FACTS,
        }
    }
}

impl From<&Config> for StoreOptions {
    fn from(config: &Config) -> Self {
        Self {
            supersession_threshold: config.retrieval.supersession_threshold,
            max_invalidated: config.retrieval.max_invalidated,
        }
    }
}

/// Input to [`FactStore::add_fact`].
#[derive(Debug, Clone)]
pub struct NewFact {
    pub subject: String,
    pub body: String,
    pub kind: FactKind,
    pub scope: FactScope,
    pub confidence: f64,
    pub source_file: String,
    pub source_prompt: String,
    pub tags: Vec<String>,
    pub depends_on: Vec<String>,
}

impl Default for NewFact {
    fn default() -> Self {
        Self {
            subject: String::new(),
            body: String::new(),
            kind: FactKind::Pattern,
            scope: FactScope::Project,
            confidence: DEFAULT_CONFIDENCE,
            source_file: String::new(),
            source_prompt: String::new(),
            tags: Vec::new(),
            depends_on: Vec::new(),
        }
    }
}

impl NewFact {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            ..Self::default()
        }
    }
}

/// Fact counts for reporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub total: usize,
    pub valid: usize,
    pub invalidated: usize,
    pub needs_review: usize,
    pub with_embedding: usize,
    /// Valid facts per scope, in scope order.
    pub by_scope: Vec<(FactScope, usize)>,
    /// Valid facts per kind, in declaration order.
    pub by_kind: Vec<(FactKind, usize)>,
}

/// Scoped, supersession-based fact memory.
pub struct FactStore {
    identity: ScopeIdentity,
    repository: Box<dyn FactRepository>,
    embedder: CachedEmbedder,
    assembler: ContextAssembler,
    options: StoreOptions,
    facts: Vec<Fact>,
}

impl FactStore {
    /// Open the store for `codebase_root` using `config`.
    pub fn open(config: &Config, codebase_root: Option<&Path>) -> Result<Self> {
        let identity = detect_org_and_project(codebase_root);

        std::fs::create_dir_all(&config.storage.root).with_context(|| {
            format!(
                "Failed to create storage directory {}",
                config.storage.root.display()
            )
        })?;

        let provider = create_provider(&config.embedding).unwrap_or_else(|e| {
            warn!("embeddings unavailable, using default similarity: {:#}", e);
            Box::new(DisabledProvider) as Box<dyn EmbeddingProvider>
        });
        let embedder = CachedEmbedder::from_config(provider, &config.embedding);
        info!("embedding provider: {}", embedder.model_name());

        let repository =
            JsonFileRepository::new(&config.storage.root).with_dims(embedder.expected_dims());

        let mut store = Self::with_parts(
            identity.clone(),
            Box::new(repository),
            embedder,
            StoreOptions::from(config),
        );

        store.maybe_migrate(&config.storage.legacy_dir)?;

        if config.constraints.auto_ingest {
            let mut ingester = ConstraintIngester::new(
                config.constraints.sources.clone(),
                codebase_root,
                identity,
                &config.storage.checksum_path,
            );
            store.ingest_constraints(&mut ingester)?;
        }

        Ok(store)
    }

    /// Build a store from injected collaborators and load its partitions.
    pub fn with_parts(
        identity: ScopeIdentity,
        repository: Box<dyn FactRepository>,
        embedder: CachedEmbedder,
        options: StoreOptions,
    ) -> Self {
        let mut store = Self {
            identity,
            repository,
            embedder,
            assembler: ContextAssembler::new(options.max_invalidated),
            options,
            facts: Vec::new(),
        };
        store.load();
        store
    }

    pub fn identity(&self) -> &ScopeIdentity {
        &self.identity
    }

    /// Record a fact, superseding the most similar existing one if any.
    ///
    /// Every call stores a fact. All partitions are written before
    /// returning; the returned fact reflects any confidence carry.
    pub fn add_fact(&mut self, new: NewFact) -> Result<Fact> {
        let text = format!("{} {}", new.subject, new.body);
        let embedding = self.embedder.embed_text(&text);

        let mut fact = Fact::new(new.subject, new.body, new.kind, new.scope)
            .with_identity(&self.identity)
            .with_confidence(new.confidence)
            .with_tags(new.tags)
            .with_embedding(embedding);
        fact.metadata.source_file = new.source_file;
        fact.metadata.source_prompt = new.source_prompt;
        fact.depends_on = new.depends_on;

        if let Some((idx, similarity)) =
            supersede::find_candidate(&self.facts, &fact, self.options.supersession_threshold)
        {
            let outcome = supersede::supersede(&mut self.facts, idx, &mut fact, similarity);
            info!(
                "fact {} supersedes {} (similarity {:.3})",
                outcome.successor_id, outcome.superseded_id, outcome.similarity
            );
            if !outcome.review_marked.is_empty() {
                info!(
                    "{} dependent facts marked for review: {}",
                    outcome.review_marked.len(),
                    outcome.review_marked.join(", ")
                );
            }
        }

        self.facts.push(fact.clone());
        self.save()?;
        Ok(fact)
    }

    /// Top `k` valid, non-constraint facts for `query`.
    ///
    /// Returned facts have their access statistics updated, and the
    /// partitions are rewritten when anything was returned.
    pub fn retrieve_relevant(&mut self, query: &str, k: usize) -> Result<Vec<Fact>> {
        let query_vec = self.embedder.embed_text(query);
        let now = models::now();

        let ids: Vec<String> = rank_facts(
            self.facts
                .iter()
                .filter(|f| f.is_valid && f.kind != FactKind::Constraint),
            query_vec.as_deref(),
            now,
        )
        .into_iter()
        .take(k)
        .map(|scored| scored.fact.id.clone())
        .collect();

        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (idx, fact) in self.facts.iter().enumerate() {
            positions.entry(fact.id.as_str()).or_insert(idx);
        }
        let indices: Vec<usize> = ids
            .iter()
            .filter_map(|id| positions.get(id.as_str()).copied())
            .collect();

        let mut results = Vec::with_capacity(indices.len());
        for idx in indices {
            let fact = &mut self.facts[idx];
            fact.metadata.touch(now);
            results.push(fact.clone());
        }

        if !results.is_empty() {
            self.save()?;
        }
        Ok(results)
    }

    /// Assemble layered context for `query` over every fact in memory.
    pub fn build_context(
        &mut self,
        query: &str,
        environment: Environment,
        k: usize,
    ) -> ContextResult {
        let query_vec = self.embedder.embed_text(query);
        self.assembler.assemble(
            &self.facts,
            ContextRequest {
                query,
                query_embedding: query_vec.as_deref(),
                environment,
                k,
            },
        )
    }

    pub fn format_context_for_prompt(&self, ctx: &ContextResult) -> String {
        self.assembler.format_context_for_prompt(ctx)
    }

    /// Every fact in memory, including invalidated ones.
    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    pub fn get(&self, id: &str) -> Option<&Fact> {
        self.facts.iter().find(|f| f.id == id)
    }

    /// The supersession chain through `id`, oldest first.
    ///
    /// Empty when `id` is unknown. Broken or cyclic links end the walk.
    pub fn supersession_chain(&self, id: &str) -> Vec<&Fact> {
        let Some(start) = self.get(id) else {
            return Vec::new();
        };

        let mut seen: HashSet<&str> = HashSet::from([start.id.as_str()]);
        let mut oldest = start;
        while let Some(prev) = oldest.supersedes.as_deref().and_then(|p| self.get(p)) {
            if !seen.insert(prev.id.as_str()) {
                break;
            }
            oldest = prev;
        }

        let mut chain = vec![oldest];
        let mut seen: HashSet<&str> = HashSet::from([oldest.id.as_str()]);
        let mut current = oldest;
        while let Some(next) = current.superseded_by.as_deref().and_then(|n| self.get(n)) {
            if !seen.insert(next.id.as_str()) {
                break;
            }
            chain.push(next);
            current = next;
        }
        chain
    }

    /// Valid facts flagged because a dependency was superseded.
    pub fn needs_review(&self) -> Vec<&Fact> {
        self.facts
            .iter()
            .filter(|f| f.is_valid && f.needs_review)
            .collect()
    }

    /// Saturating measure of how much the store knows, in `[0.0, 1.0)`.
    pub fn memory_level(&self) -> f64 {
        let valid = self.facts.iter().filter(|f| f.is_valid).count();
        if valid == 0 {
            return 0.0;
        }
        1.0 - 1.0 / (1.0 + valid as f64 / MEMORY_LEVEL_REFERENCE)
    }

    pub fn stats(&self) -> StoreStats {
        let valid: Vec<&Fact> = self.facts.iter().filter(|f| f.is_valid).collect();
        StoreStats {
            total: self.facts.len(),
            valid: valid.len(),
            invalidated: self.facts.len() - valid.len(),
            needs_review: valid.iter().filter(|f| f.needs_review).count(),
            with_embedding: self.facts.iter().filter(|f| f.embedding.is_some()).count(),
            by_scope: FactScope::ALL
                .iter()
                .map(|s| (*s, valid.iter().filter(|f| f.scope == *s).count()))
                .collect(),
            by_kind: FactKind::ALL
                .iter()
                .map(|k| (*k, valid.iter().filter(|f| f.kind == *k).count()))
                .collect(),
        }
    }

    /// Run one constraint ingestion pass and persist any changes.
    ///
    /// Checksums are written only after the facts are saved, so a failed
    /// save leaves the changed files to be ingested again next time.
    pub fn ingest_constraints(
        &mut self,
        ingester: &mut ConstraintIngester,
    ) -> Result<IngestReport> {
        let report = ingester.ingest(&mut self.facts);
        if !report.is_empty() {
            self.facts.extend(report.new_facts.iter().cloned());
            self.save()?;
            info!(
                "constraints: {} new, {} superseded",
                report.new_facts.len(),
                report.superseded_ids.len()
            );
        }
        ingester.save_checksums()?;
        Ok(report)
    }

    /// Import legacy memory files when the store has no learned facts yet.
    ///
    /// Returns the number of imported facts. Conversion problems are
    /// logged; only the follow-up save can fail.
    pub fn maybe_migrate(&mut self, legacy_dir: &Path) -> Result<usize> {
        if self.facts.iter().any(|f| f.kind != FactKind::Constraint) {
            return Ok(0);
        }
        if !migrate::has_legacy_files(legacy_dir, &self.identity) {
            return Ok(0);
        }

        let migrated = migrate::migrate_from_legacy(legacy_dir, &self.identity);
        let count = migrated.len();
        if count > 0 {
            self.facts.extend(migrated);
            self.save()?;
            info!("migrated {} facts from legacy format", count);
        }
        Ok(count)
    }

    /// Rewrite every partition of this identity from the in-memory set.
    pub fn save(&self) -> Result<()> {
        let mut grouped: HashMap<Partition, Vec<&Fact>> = HashMap::new();
        let mut orphaned = 0usize;
        for fact in &self.facts {
            match Partition::for_scope(fact.scope, &self.identity) {
                Some(partition) => grouped.entry(partition).or_default().push(fact),
                None => orphaned += 1,
            }
        }
        if orphaned > 0 {
            warn!(
                "{} facts have no partition for org '{}' / project '{}' and are not persisted",
                orphaned, self.identity.org_id, self.identity.project_id
            );
        }

        for partition in Partition::for_identity(&self.identity) {
            let facts = grouped.remove(&partition).unwrap_or_default();
            self.repository
                .save_partition(&partition, &facts)
                .with_context(|| format!("Failed to save {} partition", partition))?;
        }
        Ok(())
    }

    /// Replace the in-memory set with the contents of every partition.
    ///
    /// A partition that fails to load is logged and contributes nothing.
    pub fn load(&mut self) {
        self.facts.clear();
        for partition in Partition::for_identity(&self.identity) {
            match self.repository.load_partition(&partition) {
                Ok(facts) => {
                    debug!("loaded {} facts from {} partition", facts.len(), partition);
                    self.facts.extend(facts);
                }
                Err(e) => error!("failed to load {} partition: {:#}", partition, e),
            }
        }
        info!("loaded {} facts", self.facts.len());
    }
}
