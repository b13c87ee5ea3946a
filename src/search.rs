//! Relevance search over stored facts.
//!
//! Backs the `mem search` command. Ranking is done by
//! [`FactStore::retrieve_relevant`], so searching also records access on
//! every returned fact.

use anyhow::Result;

use memory_harness_core::context::{truncate_chars, VALID_BODY_CHARS};

use crate::get::format_ts_iso;
use crate::store::FactStore;

/// CLI entry point: retrieve the top `k` facts and print them.
pub fn run_search(store: &mut FactStore, query: &str, k: usize) -> Result<()> {
    let results = store.retrieve_relevant(query, k)?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, fact) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            fact.metadata.confidence,
            fact.kind,
            fact.subject
        );
        println!("    scope: {}", fact.scope);
        println!("    created: {}", format_ts_iso(&fact.metadata.created_at));
        println!("    accessed: {} time(s)", fact.metadata.access_count);
        if fact.needs_review {
            println!("    needs review: a dependency was superseded");
        }
        println!(
            "    excerpt: \"{}\"",
            truncate_chars(&fact.body, VALID_BODY_CHARS)
                .replace('\n', " ")
                .trim()
        );
        println!("    id: {}", fact.id);
        println!();
    }

    Ok(())
}
