use std::path::Path;

use anyhow::Result;
use sluice_engine::{ConnectorRegistry, ExecutionOptions, ResourceResult};

use super::load_pipeline;

/// Execute the `run` command: parse, run, and print a per-resource summary.
pub async fn execute(pipeline_path: &Path, dry_run: bool, resource: Option<String>) -> Result<()> {
    let config = load_pipeline(pipeline_path)?;
    tracing::info!(
        pipeline = %pipeline_path.display(),
        resources = config.resources.len(),
        dry_run,
        "Pipeline parsed"
    );
    let options = ExecutionOptions {
        dry_run,
        only: resource,
    };
    let registry = ConnectorRegistry::builtin();

    let result = sluice_engine::run_pipeline(&config, &registry, &options).await?;

    if dry_run {
        println!("Dry run: nothing was written and no state was persisted.");
    }
    for resource in &result.resources {
        print_resource(resource);
    }
    let totals = result.totals();
    println!(
        "\nTotal: {} read, {} written, {} failed in {:.2}s",
        totals.records_read, totals.records_written, totals.records_failed, result.duration_secs
    );

    let failed = result.resources.iter().filter(|r| r.is_failed()).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} resource(s) failed", result.resources.len());
    }
    Ok(())
}

fn print_resource(result: &ResourceResult) {
    println!("Resource '{}': {}", result.resource, result.status);
    if !result.run_id.is_empty() {
        println!("  Run ID:          {}", result.run_id);
    }
    println!("  Records read:    {}", result.counts.records_read);
    println!("  Records written: {}", result.counts.records_written);
    println!("  Records failed:  {}", result.counts.records_failed);
    if result.counts.records_warned > 0 {
        println!("  Records warned:  {}", result.counts.records_warned);
    }
    println!("  Batches:         {}", result.counts.batches);
    if result.counts.retries > 0 {
        println!("  Retries:         {}", result.counts.retries);
    }
    println!("  Duration:        {:.2}s", result.duration_secs);
    if let Some(plan) = &result.schema_plan {
        for statement in plan.rendered() {
            let marker = if plan.applied { "applied" } else { "planned" };
            println!("  Schema ({marker}): {statement}");
        }
    }
    if let Some(location) = &result.dead_letter_location {
        println!("  Dead letters:    {location}");
    }
    if let Some(error) = &result.error {
        println!("  Error:           {error}");
    }
}
