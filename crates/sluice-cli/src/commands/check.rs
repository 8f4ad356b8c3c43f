use std::path::Path;

use anyhow::Result;
use sluice_engine::result::ConnectionStatus;
use sluice_engine::ConnectorRegistry;

use super::load_pipeline;

/// Execute the `check` command: validate config, test connectivity, and
/// report schema compatibility and planned DDL.
pub fn execute(pipeline_path: &Path) -> Result<()> {
    let config = load_pipeline(pipeline_path)?;
    let result = sluice_engine::check_pipeline(&config, &ConnectorRegistry::builtin())?;
    println!("Pipeline structure: OK");

    for check in &result.resources {
        println!("\nResource '{}':", check.resource);
        print_connection("Source", &check.source);
        print_connection("Destination", &check.destination);
        if let Some(report) = &check.schema_report {
            if report.issues.is_empty() {
                println!("  {:16} OK", "Schema:");
            } else {
                let verdict = if report.passes() { "WARNING" } else { "FAILED" };
                println!("  {:16} {verdict}", "Schema:");
                for issue in &report.issues {
                    println!("    {issue}");
                }
            }
        }
        for statement in &check.planned_statements {
            println!("  Planned DDL: {statement}");
        }
        for error in &check.errors {
            println!("  Error: {error}");
        }
    }

    if result.passed() {
        println!("\nAll checks passed.");
        Ok(())
    } else {
        anyhow::bail!("One or more checks failed")
    }
}

fn print_connection(label: &str, status: &ConnectionStatus) {
    match status {
        ConnectionStatus::Ok => println!("  {:16} OK", format!("{label}:")),
        ConnectionStatus::Failed(message) => {
            println!("  {:16} FAILED", format!("{label}:"));
            println!("    {message}");
        }
    }
}
