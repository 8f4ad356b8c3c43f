//! Batch pipeline engine for Sluice: schema intelligence, quality gating,
//! checkpointed extraction and the orchestrator that ties them together.

pub mod checkpoint;
pub mod coerce;
pub mod config;
pub mod connector;
pub mod connectors;
pub mod dlq;
pub mod errors;
pub mod execution;
pub mod manifest;
pub mod orchestrator;
pub mod preflight;
pub mod quality;
pub mod registry;
pub mod result;
pub mod retry;
pub mod schema;
pub mod state;

// Re-export public API for convenience
pub use config::{parse_pipeline, parse_pipeline_str, validate_pipeline, PipelineConfig};
pub use connector::{Destination, ExtractQuery, RecordStream, Source};
pub use errors::{PipelineError, Side};
pub use execution::ExecutionOptions;
pub use orchestrator::{check_pipeline, run_pipeline, run_resource, ResourceContext};
pub use quality::CheckRegistry;
pub use registry::ConnectorRegistry;
pub use result::{CheckResult, PipelineResult, ResourceCheck, ResourceResult, RunCounts};
pub use retry::{RetryConfig, RetryPolicy};
pub use state::{open_state, StateHandles};
