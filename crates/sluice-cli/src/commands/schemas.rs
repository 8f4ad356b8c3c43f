use std::path::Path;

use anyhow::Result;
use sluice_engine::open_state;

use super::load_pipeline;

/// Execute the `schemas` command: list schema history snapshots for one
/// resource, oldest first.
pub fn execute(pipeline_path: &Path, resource: &str) -> Result<()> {
    let config = load_pipeline(pipeline_path)?;
    if config.resource(resource).is_none() {
        anyhow::bail!("Pipeline has no resource named '{resource}'");
    }
    let state = open_state(&config.state)?;
    let history = state.backend.schema_history(resource)?;

    if history.is_empty() {
        println!("No schema history for '{resource}'.");
        return Ok(());
    }
    for snapshot in &history {
        println!(
            "v{}  {}  {} column(s)",
            snapshot.version,
            snapshot.captured_at.format("%Y-%m-%d %H:%M:%S"),
            snapshot.schema.len()
        );
        for column in snapshot.schema.columns() {
            let null = if column.nullable { "NULL" } else { "NOT NULL" };
            println!("    {} {} {null}", column.name, column.data_type);
        }
        for statement in &snapshot.statements {
            println!("  -> {statement}");
        }
    }
    Ok(())
}
