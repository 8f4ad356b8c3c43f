//! Parsing and validating the pipeline fixtures under `tests/fixtures`.

use std::path::PathBuf;

use sluice_engine::config::{parse_pipeline, validate_pipeline, StateBackendKind};
use sluice_engine::schema::EvolutionMode;
use sluice_engine::{check_pipeline, ConnectorRegistry, PipelineError};
use sluice_types::quality::{CheckKind, QualityAction};
use sluice_types::value::Value;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("tests/fixtures/pipelines")
        .join(name)
}

#[test]
fn parse_and_validate_jsonl_fixture() {
    std::env::set_var("SLUICE_TEST_STATE_DIR", "/tmp/sluice-state");
    std::env::set_var("SLUICE_TEST_DATA_DIR", "/tmp/sluice-data");

    let config = parse_pipeline(&fixture("jsonl_users.yaml")).expect("fixture must parse");

    assert_eq!(config.parallelism, 2);
    assert_eq!(config.state.backend, StateBackendKind::Sqlite);
    assert_eq!(config.state.path, PathBuf::from("/tmp/sluice-state"));
    assert_eq!(config.sources[0].kind, "jsonl");
    assert_eq!(config.sources[0].config["path"], "/tmp/sluice-data/users.jsonl");

    let users = config.resource("users").unwrap();
    assert_eq!(users.batch_size, 500);
    assert_eq!(users.tracking_column.as_deref(), Some("id"));
    assert_eq!(users.initial_value, Some(Value::Int(0)));
    assert!(users.schema.enabled);
    assert_eq!(users.schema.evolution.mode, EvolutionMode::Auto);
    assert_eq!(users.quality_checks.len(), 4);
    assert_eq!(users.quality_checks[1].action, QualityAction::Quarantine);
    assert!(matches!(users.quality_checks[2].kind, CheckKind::Range { min: Some(_), max: Some(_) }));
    assert_eq!(users.retry.max_attempts, 5);

    validate_pipeline(&config).expect("fixture must validate");
}

#[test]
fn unknown_state_backend_fails_at_parse_time() {
    let err = parse_pipeline(&fixture("invalid_pipeline.yaml")).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("unknown variant"), "got: {msg}");
}

#[test]
fn semantic_errors_are_all_reported() {
    let config = parse_pipeline(&fixture("invalid_semantics.yaml")).unwrap();
    let msg = validate_pipeline(&config).unwrap_err().to_string();

    for expected in [
        "parallelism",
        "Duplicate Source name 'src'",
        "unknown destination 'missing'",
        "batch_size",
        "enables checkpoint but has no tracking_column",
        "min",
    ] {
        assert!(msg.contains(expected), "missing {expected:?} in: {msg}");
    }
}

#[test]
fn engine_surfaces_validation_as_configuration_error() {
    let config = parse_pipeline(&fixture("invalid_semantics.yaml")).unwrap();
    let err = check_pipeline(&config, &ConnectorRegistry::builtin()).unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
    assert_eq!(err.kind(), "configuration_error");
}
