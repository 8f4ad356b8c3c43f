use std::path::Path;

use anyhow::Result;
use sluice_engine::open_state;
use sluice_types::manifest::ManifestEntry;
use sluice_types::state::PipelineId;

use super::load_pipeline;

/// Execute the `history` command: list manifest entries, newest last.
pub fn execute(
    pipeline_path: &Path,
    resource: Option<&str>,
    failed_only: bool,
    limit: Option<usize>,
) -> Result<()> {
    let config = load_pipeline(pipeline_path)?;
    let state = open_state(&config.state)?;
    let pipeline = resource.map(PipelineId::new);

    let mut entries = if failed_only {
        state.backend.failed_runs(pipeline.as_ref())?
    } else {
        state.backend.manifest_entries(pipeline.as_ref())?
    };
    if let Some(limit) = limit {
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
    }

    if entries.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }
    for entry in &entries {
        print_entry(entry);
    }
    Ok(())
}

fn print_entry(entry: &ManifestEntry) {
    println!(
        "{}  {:<20} {:<8} read={} written={} failed={} {:.2}s  {}",
        entry.started_at.format("%Y-%m-%d %H:%M:%S"),
        entry.pipeline_name.as_str(),
        entry.status.as_str(),
        entry.records_read,
        entry.records_written,
        entry.records_failed,
        entry.duration_secs,
        entry.run_id,
    );
    if let Some(error) = &entry.error_message {
        println!("    {error}");
    }
}
