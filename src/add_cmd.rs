//! Recording new facts from the command line.

use anyhow::Result;

use crate::store::{FactStore, NewFact};

/// CLI entry point: store one fact and report any supersession.
pub fn run_add(store: &mut FactStore, new: NewFact) -> Result<()> {
    let fact = store.add_fact(new)?;

    println!("Stored fact {}", fact.id);
    println!("    {} / {} / {}", fact.scope, fact.kind, fact.subject);
    if let Some(ref old) = fact.supersedes {
        println!(
            "    supersedes {} (confidence now {:.2})",
            old, fact.metadata.confidence
        );
        let flagged = store
            .needs_review()
            .iter()
            .filter(|f| f.depends_on.contains(old))
            .count();
        if flagged > 0 {
            println!("    {} dependent fact(s) flagged for review", flagged);
        }
    }
    if fact.embedding.is_none() {
        println!("    (no embedding; similarity defaults apply)");
    }

    Ok(())
}
