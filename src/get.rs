//! Fact retrieval by ID.
//!
//! Prints one fact in full, followed by the supersession chain it belongs
//! to. Used by the `mem get` CLI command.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use memory_harness_core::models::Fact;

use crate::store::FactStore;

/// CLI entry point: prints the fact and its chain to stdout.
pub fn run_get(store: &FactStore, id: &str) -> Result<()> {
    let Some(fact) = store.get(id) else {
        bail!("fact not found: {}", id);
    };

    print_fact(fact);

    let chain = store.supersession_chain(id);
    if chain.len() > 1 {
        println!("--- Supersession chain ({}) ---", chain.len());
        for (i, link) in chain.iter().enumerate() {
            let marker = if link.id == fact.id { "*" } else { " " };
            let state = if link.is_valid { "valid" } else { "superseded" };
            println!(
                "{} {}. [{}] {} ({}, confidence={:.2})",
                marker,
                i + 1,
                link.id,
                link.subject,
                state,
                link.metadata.confidence
            );
        }
        println!();
    }

    Ok(())
}

/// Print every field of a fact in the `--- Fact ---` layout.
pub fn print_fact(fact: &Fact) {
    println!("--- Fact ---");
    println!("id:            {}", fact.id);
    println!("subject:       {}", fact.subject);
    println!("kind:          {}", fact.kind);
    println!("scope:         {}", fact.scope);
    if !fact.org_id.is_empty() {
        println!("org_id:        {}", fact.org_id);
    }
    if !fact.project_id.is_empty() {
        println!("project_id:    {}", fact.project_id);
    }
    println!("valid:         {}", fact.is_valid);
    if let Some(ref prev) = fact.supersedes {
        println!("supersedes:    {}", prev);
    }
    if let Some(ref next) = fact.superseded_by {
        println!("superseded_by: {}", next);
    }
    if !fact.depends_on.is_empty() {
        println!("depends_on:    {}", fact.depends_on.join(", "));
    }
    if fact.needs_review {
        println!("needs_review:  true");
    }
    println!("confidence:    {:.2}", fact.metadata.confidence);
    println!("created_at:    {}", format_ts_iso(&fact.metadata.created_at));
    println!("last_accessed: {}", format_ts_iso(&fact.metadata.last_accessed));
    println!("access_count:  {}", fact.metadata.access_count);
    if !fact.metadata.source_file.is_empty() {
        println!("source_file:   {}", fact.metadata.source_file);
    }
    if !fact.tags.is_empty() {
        println!("tags:          {}", fact.tags.join(", "));
    }
    println!(
        "embedding:     {}",
        fact.embedding
            .as_ref()
            .map(|e| format!("{} dims", e.len()))
            .unwrap_or_else(|| "none".to_string())
    );
    println!();

    println!("--- Body ---");
    println!("{}", fact.body);
    println!();
}

pub(crate) fn format_ts_iso(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
