//! # Memory Harness Core
//!
//! Shared, I/O-free logic for Memory Harness: the fact data model,
//! embedding trait, relevance scoring, supersession policy, context
//! assembly, legacy-entry conversion, and the partition repository trait.
//!
//! This crate contains no filesystem, network, or process dependencies.
//! The `memory-harness` app crate supplies those and the `FactStore`
//! orchestrator that ties everything together.

pub mod context;
pub mod embedding;
pub mod legacy;
pub mod models;
pub mod search;
pub mod store;
pub mod supersede;
