pub mod check;
pub mod connectors;
pub mod history;
pub mod run;
pub mod schemas;

use std::path::Path;

use anyhow::{Context, Result};
use sluice_engine::PipelineConfig;

/// Parse a pipeline file, naming it in the error.
pub fn load_pipeline(pipeline_path: &Path) -> Result<PipelineConfig> {
    sluice_engine::parse_pipeline(pipeline_path)
        .with_context(|| format!("Failed to parse pipeline: {}", pipeline_path.display()))
}
