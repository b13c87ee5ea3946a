//! Store statistics and review queue.
//!
//! `mem stats` gives a quick summary of what the memory holds: fact
//! counts, embedding coverage, and per-scope and per-kind breakdowns.
//! `mem review` lists facts whose dependencies were superseded.

use anyhow::Result;

use crate::get::format_ts_iso;
use crate::store::FactStore;

/// Run the stats command: summarize the store and print it.
pub fn run_stats(store: &FactStore) -> Result<()> {
    let stats = store.stats();
    let identity = store.identity();

    println!("Memory Harness: Fact Stats");
    println!("==========================");
    println!();
    println!("  Org:          {}", identity.org_id);
    println!(
        "  Project:      {}",
        if identity.project_id.is_empty() {
            "(none)"
        } else {
            &identity.project_id
        }
    );
    println!();
    println!("  Facts:        {}", stats.total);
    println!("  Valid:        {}", stats.valid);
    println!("  Invalidated:  {}", stats.invalidated);
    println!("  Needs review: {}", stats.needs_review);
    println!(
        "  Embedded:     {} / {} ({}%)",
        stats.with_embedding,
        stats.total,
        if stats.total > 0 {
            (stats.with_embedding * 100) / stats.total
        } else {
            0
        }
    );
    println!("  Memory level: {:.2}", store.memory_level());

    if stats.valid > 0 {
        println!();
        println!("  By scope:");
        for (scope, count) in stats.by_scope.iter().filter(|(_, c)| *c > 0) {
            println!("    {:<16} {:>6}", scope, count);
        }
        println!();
        println!("  By kind:");
        for (kind, count) in stats.by_kind.iter().filter(|(_, c)| *c > 0) {
            println!("    {:<16} {:>6}", kind, count);
        }
    }

    println!();
    Ok(())
}

/// Run the review command: list valid facts flagged for review.
pub fn run_review(store: &FactStore) -> Result<()> {
    let flagged = store.needs_review();
    if flagged.is_empty() {
        println!("No facts need review.");
        return Ok(());
    }

    println!("{} fact(s) need review:", flagged.len());
    println!();
    for fact in flagged {
        println!("[{}] {} ({}, {})", fact.id, fact.subject, fact.kind, fact.scope);
        for dep in &fact.depends_on {
            let state = match store.get(dep) {
                Some(d) if d.is_valid => "valid".to_string(),
                Some(d) => match d.superseded_by {
                    Some(ref next) => format!("superseded by {}", next),
                    None => "invalidated".to_string(),
                },
                None => "missing".to_string(),
            };
            println!("    depends on {}: {}", dep, state);
        }
        println!("    last accessed: {}", format_ts_iso(&fact.metadata.last_accessed));
        println!();
    }
    Ok(())
}
