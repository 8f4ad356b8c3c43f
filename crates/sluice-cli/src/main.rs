mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sluice", version, about = "Batch pipelines with schema checks, quality gates and checkpoints")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline
    Run {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
        /// Read, validate and count without writing or persisting state
        #[arg(long)]
        dry_run: bool,
        /// Run only this resource
        #[arg(long)]
        resource: Option<String>,
    },
    /// Validate configuration, connectivity and schema compatibility
    Check {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
    },
    /// List recorded runs
    History {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
        /// Only runs of this resource
        #[arg(long)]
        resource: Option<String>,
        /// Only failed runs
        #[arg(long)]
        failed: bool,
        /// Show at most this many of the most recent runs
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List schema history snapshots for a resource
    Schemas {
        /// Path to pipeline YAML file
        pipeline: PathBuf,
        /// Resource name
        resource: String,
    },
    /// List registered connector types
    Connectors,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            pipeline,
            dry_run,
            resource,
        } => commands::run::execute(&pipeline, dry_run, resource).await,
        Commands::Check { pipeline } => commands::check::execute(&pipeline),
        Commands::History {
            pipeline,
            resource,
            failed,
            limit,
        } => commands::history::execute(&pipeline, resource.as_deref(), failed, limit),
        Commands::Schemas { pipeline, resource } => commands::schemas::execute(&pipeline, &resource),
        Commands::Connectors => {
            commands::connectors::execute();
            Ok(())
        }
    }
}
