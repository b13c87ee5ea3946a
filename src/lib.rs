//! # Memory Harness
//!
//! A scoped, supersession-based fact memory for AI assistants.
//!
//! Memory Harness stores discrete facts (decisions, patterns, constraints,
//! failures) in per-scope JSON files, replaces a fact automatically when a
//! near-duplicate is recorded, and assembles layered markdown context for
//! language-model prompts.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌───────────────┐
//! │ Constraints │──▶│  FactStore  │──▶│  JSON files   │
//! │ CLAUDE.md…  │   │ supersede + │   │ global / org /│
//! └─────────────┘   │  rank facts │   │ project       │
//!                   └──────┬──────┘   └───────────────┘
//!                          │
//!              ┌───────────┴──────────┐
//!              ▼                      ▼
//!        ┌──────────┐          ┌────────────┐
//!        │ Embedder │          │  Context   │
//!        │ LRU+trunc│          │ Assembler  │
//!        └──────────┘          └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! mem add "Use sqlx" "All queries go through sqlx." --kind decision
//! mem search "database access"
//! mem context "add a migration" --env branch=main
//! mem stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`scope`] | Org and project identity detection |
//! | [`embedding`] | Embedding providers and the caching embedder |
//! | [`json_store`] | Partition files on disk |
//! | [`constraints`] | Constraint ingestion from documentation |
//! | [`migrate`] | Legacy memory import |
//! | [`store`] | The `FactStore` orchestrator |
//! | [`add_cmd`], [`search`], [`context_cmd`], [`get`], [`stats`] | CLI commands |
//!
//! Pure logic (data model, scoring, supersession, context assembly) lives
//! in the `memory-harness-core` crate.

pub mod add_cmd;
pub mod config;
pub mod constraints;
pub mod context_cmd;
pub mod embedding;
pub mod get;
pub mod json_store;
pub mod migrate;
pub mod scope;
pub mod search;
pub mod stats;
pub mod store;
