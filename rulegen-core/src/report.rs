//! Missing-rules report: source rules that have no persisted record yet.

use crate::storage::RuleStorage;
use crate::types::Rule;
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingRule {
    pub number: String,
    pub name: String,
}

/// Rules whose package directory does not exist, in input order
pub fn missing_rules(storage: &dyn RuleStorage, rules: &[Rule]) -> Vec<MissingRule> {
    rules
        .iter()
        .filter(|rule| !storage.rule_exists(&rule.benchmark.id, &rule.rule_number))
        .map(|rule| MissingRule {
            number: rule.rule_number.clone(),
            name: rule.name.clone(),
        })
        .collect()
}

/// `number,name` CSV with a header row
pub fn write_missing_rules<W: Write>(writer: W, missing: &[MissingRule]) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
    for entry in missing {
        csv_writer
            .serialize(entry)
            .with_context(|| format!("writing report row for {}", entry.number))?;
    }
    // An empty report still gets its header
    if missing.is_empty() {
        csv_writer
            .write_record(["number", "name"])
            .context("writing report header")?;
    }
    csv_writer.flush().context("flushing report")?;
    Ok(())
}
