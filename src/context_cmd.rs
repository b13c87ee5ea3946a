//! Prompt context assembly from the command line.
//!
//! `mem context "<query>"` prints the markdown block a caller would inject
//! into a prompt. `--env KEY=VALUE` pairs are passed through to the
//! assembled context; values that parse as JSON keep their JSON type.

use anyhow::Result;

use memory_harness_core::models::Environment;

use crate::store::FactStore;

/// CLI entry point: assemble and print context for `query`.
pub fn run_context(
    store: &mut FactStore,
    query: &str,
    k: usize,
    env: Vec<(String, String)>,
    json: bool,
) -> Result<()> {
    let ctx = store.build_context(query, build_environment(env), k);

    if json {
        println!("{}", serde_json::to_string_pretty(&ctx)?);
        return Ok(());
    }

    if ctx.is_empty() {
        println!("No context.");
        return Ok(());
    }

    println!("{}", store.format_context_for_prompt(&ctx));
    Ok(())
}

/// Collect `KEY=VALUE` pairs into an environment map.
///
/// Later keys overwrite earlier ones.
pub fn build_environment(pairs: Vec<(String, String)>) -> Environment {
    pairs
        .into_iter()
        .map(|(key, raw)| {
            let value = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));
            (key, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_environment_values() {
        let env = build_environment(vec![
            ("branch".to_string(), "main".to_string()),
            ("dirty".to_string(), "true".to_string()),
            ("ahead".to_string(), "3".to_string()),
            ("branch".to_string(), "feature".to_string()),
        ]);
        assert_eq!(env.len(), 3);
        assert_eq!(env["branch"], json!("feature"));
        assert_eq!(env["dirty"], json!(true));
        assert_eq!(env["ahead"], json!(3));
    }
}
