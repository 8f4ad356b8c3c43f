//! Pipeline configuration: YAML types, parsing and validation.

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{parse_pipeline, parse_pipeline_str, substitute_env_vars};
pub use types::{
    EndpointConfig, PipelineConfig, ResourceConfig, SchemaConfig, StateBackendKind, StateConfig,
};
pub use validator::validate_pipeline;
