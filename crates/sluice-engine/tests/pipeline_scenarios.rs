//! End-to-end resource runs over in-memory connectors.
//!
//! Each test drives the orchestrator through a full run and then inspects
//! the destination table, the manifest, checkpoints and incremental state.

use std::sync::Arc;

use rstest::rstest;
use sluice_engine::connector::{Destination, Source};
use sluice_engine::connectors::{MemoryDestination, MemorySource, MemoryTable, WriteMode};
use sluice_engine::{
    check_pipeline, parse_pipeline_str, run_pipeline, run_resource, CheckRegistry, ConnectorRegistry,
    ExecutionOptions, PipelineError, ResourceContext, StateHandles,
};
use sluice_state::{FileCheckpointStore, SqliteStateBackend};
use sluice_types::error::ConnectorError;
use sluice_types::manifest::RunStatus;
use sluice_types::record::Record;
use sluice_types::schema::{Column, DataType, DdlStatement, Schema};
use sluice_types::state::PipelineId;
use sluice_types::value::Value;
use tempfile::TempDir;

const BASE: &str = "name: users\nsource: src\ndestination: dst\n";

fn harness(extra_yaml: &str) -> (TempDir, ResourceContext) {
    let dir = tempfile::tempdir().unwrap();
    let resource = serde_yaml::from_str(&format!("{BASE}{extra_yaml}")).unwrap();
    let ctx = ResourceContext {
        resource,
        state: StateHandles {
            backend: Arc::new(SqliteStateBackend::in_memory().unwrap()),
            checkpoints: Arc::new(FileCheckpointStore::new(dir.path())),
        },
        checks: CheckRegistry::new(),
        dry_run: false,
    };
    (dir, ctx)
}

fn pid() -> PipelineId {
    PipelineId::new("users")
}

fn ids(range: std::ops::RangeInclusive<i64>) -> Vec<Record> {
    range
        .map(|id| Record::new().with("id", id).with("email", format!("u{id}@example.com")))
        .collect()
}

fn table_ids(table: &MemoryTable) -> Vec<Value> {
    table.rows().iter().map(|r| r.get("id").cloned().unwrap()).collect()
}

/// Wraps a memory destination with scripted failures.
struct ScriptedDestination {
    inner: MemoryDestination,
    transient_failures: u32,
    fail_after_writes: Option<usize>,
    successful_writes: usize,
    attempts: usize,
}

impl ScriptedDestination {
    fn new(table: MemoryTable) -> Self {
        Self::with_mode(table, WriteMode::Append)
    }

    fn with_mode(table: MemoryTable, mode: WriteMode) -> Self {
        Self {
            inner: MemoryDestination::new(table, mode),
            transient_failures: 0,
            fail_after_writes: None,
            successful_writes: 0,
            attempts: 0,
        }
    }
}

impl Destination for ScriptedDestination {
    fn kind(&self) -> &str {
        "scripted"
    }

    fn test_connection(&mut self) -> Result<bool, ConnectorError> {
        Ok(true)
    }

    fn write(&mut self, batch: &[Record]) -> Result<(), ConnectorError> {
        self.attempts += 1;
        if self.transient_failures > 0 {
            self.transient_failures -= 1;
            return Err(ConnectorError::timeout("WRITE_TIMEOUT", "write timed out"));
        }
        if self.fail_after_writes.is_some_and(|n| self.successful_writes >= n) {
            return Err(ConnectorError::data("CONSTRAINT", "row rejected by destination"));
        }
        self.inner.write(batch)?;
        self.successful_writes += 1;
        Ok(())
    }

    fn get_schema(&mut self) -> Result<Option<Schema>, ConnectorError> {
        self.inner.get_schema()
    }

    fn supports_ddl(&self) -> bool {
        self.inner.supports_ddl()
    }

    fn execute_ddl(&mut self, statement: &DdlStatement) -> Result<(), ConnectorError> {
        self.inner.execute_ddl(statement)
    }

    fn replaces_content(&self) -> bool {
        self.inner.replaces_content()
    }

    fn begin_run(&mut self, resuming: bool) {
        self.inner.begin_run(resuming);
    }

    fn finalize(&mut self) -> Result<(), ConnectorError> {
        self.inner.finalize()
    }
}

#[test]
fn not_null_fail_aborts_without_checkpoint() {
    let (_dir, ctx) = harness(
        "tracking_column: seq\ncheckpoint: true\nquality_checks:\n  - { column: id, check: not_null, action: fail }\n",
    );
    let records = vec![
        Record::new().with("seq", 1).with("id", 1),
        Record::new().with("seq", 2).with("id", 2),
        Record::new().with("seq", 3).with("id", Value::Null),
        Record::new().with("seq", 4).with("id", 4),
    ];
    let table = MemoryTable::new();

    let result = run_resource(
        &ctx,
        &mut MemorySource::new(records),
        &mut MemoryDestination::new(table.clone(), WriteMode::Append),
    );

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.error_kind, Some("quality_violation"));
    assert!(result.error.as_deref().unwrap().contains("row 3"));
    assert_eq!(result.counts.records_failed, 1);
    assert!(table.is_empty());
    assert!(ctx.state.checkpoints.load(&pid()).unwrap().is_none());
    assert!(ctx.state.backend.get_last_value(&pid()).unwrap().is_none());

    let entry = ctx.state.backend.latest_run(&pid()).unwrap().unwrap();
    assert_eq!(entry.status, RunStatus::Failed);
    assert_eq!(entry.error_message, result.error);
}

#[test]
fn quarantine_writes_the_rest_and_dead_letters_one() {
    let (_dir, ctx) = harness("quality_checks:\n  - { column: id, check: not_null, action: quarantine }\n");
    let records = vec![
        Record::new().with("id", 1),
        Record::new().with("id", 2),
        Record::new().with("id", Value::Null),
    ];
    let table = MemoryTable::new();

    let result = run_resource(
        &ctx,
        &mut MemorySource::new(records),
        &mut MemoryDestination::new(table.clone(), WriteMode::Append),
    );

    assert_eq!(result.status, RunStatus::Partial);
    assert_eq!(result.counts.records_written, 2);
    assert_eq!(result.counts.records_failed, 1);
    assert_eq!(table.len(), 2);

    let dead = ctx.state.backend.dead_letters(&pid(), &result.run_id).unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].row_number, 3);
    assert_eq!(dead[0].error_kind, "quality_violation");
    assert!(result.dead_letter_location.is_some());

    let entry = ctx.state.backend.latest_run(&pid()).unwrap().unwrap();
    assert_eq!(entry.status, RunStatus::Partial);
    assert_eq!(entry.records_failed, 1);
}

#[test]
fn checkpoint_resume_extracts_only_newer_records() {
    let (_dir, ctx) = harness("tracking_column: id\ncheckpoint: true\n");
    ctx.state.checkpoints.save(&pid(), "id", &Value::Int(2), 2).unwrap();
    let table = MemoryTable::new();

    let result = run_resource(
        &ctx,
        &mut MemorySource::new(ids(1..=5)),
        &mut MemoryDestination::new(table.clone(), WriteMode::Append),
    );

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.counts.records_read, 3);
    assert_eq!(table_ids(&table), vec![Value::Int(3), Value::Int(4), Value::Int(5)]);
    assert!(ctx.state.checkpoints.load(&pid()).unwrap().is_none());
    assert_eq!(ctx.state.backend.get_last_value(&pid()).unwrap(), Some(Value::Int(5)));
}

#[test]
fn auto_evolution_adds_new_column() {
    let (_dir, ctx) = harness(
        "schema:\n  enabled: true\n  evolution:\n    mode: auto\n    on_new_column: add_nullable\n",
    );
    let table = MemoryTable::with_schema(Schema::new(vec![
        Column::new("id", DataType::Integer, false),
        Column::new("email", DataType::String, true),
    ]));
    let records = vec![
        Record::new().with("id", 1).with("email", "a@x.io").with("phone", "555-0100"),
        Record::new().with("id", 2).with("email", "b@x.io").with("phone", "555-0101"),
    ];

    let result = run_resource(
        &ctx,
        &mut MemorySource::new(records),
        &mut MemoryDestination::new(table.clone(), WriteMode::Append),
    );

    assert_eq!(result.status, RunStatus::Success, "{:?}", result.error);
    let plan = result.schema_plan.unwrap();
    assert!(plan.applied);
    assert_eq!(plan.statements.len(), 1);
    assert!(matches!(
        &plan.statements[0],
        DdlStatement::AddColumn { column, .. } if column.name == "phone" && column.nullable
    ));
    assert_eq!(table.ddl_log().len(), 1);
    assert!(table.schema().unwrap().column("phone").is_some());

    let history = ctx.state.backend.schema_history("users").unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].schema.column("phone").is_none());
}

#[test]
fn nullable_source_into_not_null_destination_aborts_before_extraction() {
    let (_dir, ctx) = harness("schema:\n  enabled: true\n");
    let table = MemoryTable::with_schema(Schema::new(vec![
        Column::new("id", DataType::Integer, false),
        Column::new("email", DataType::String, false),
    ]));
    let records = vec![
        Record::new().with("id", 1).with("email", "a@x.io"),
        Record::new().with("id", 2).with("email", Value::Null),
    ];

    let result = run_resource(
        &ctx,
        &mut MemorySource::new(records),
        &mut MemoryDestination::new(table.clone(), WriteMode::Append),
    );

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.error_kind, Some("schema_incompatibility"));
    let message = result.error.unwrap();
    assert!(message.contains("email"));
    assert!(!message.contains("'id'"));
    assert_eq!(result.counts.records_read, 0);
    assert!(table.is_empty());
}

#[test]
fn replace_mode_is_idempotent() {
    let (_dir, ctx) = harness("");
    let table = MemoryTable::new().with_rows(ids(100..=101));

    for _ in 0..2 {
        let result = run_resource(
            &ctx,
            &mut MemorySource::new(ids(1..=4)),
            &mut MemoryDestination::new(table.clone(), WriteMode::Replace),
        );
        assert_eq!(result.status, RunStatus::Success);
    }

    assert_eq!(table.len(), 4);
    assert_eq!(table.rows(), ids(1..=4));
}

#[test]
fn replace_mode_with_tracking_column_reloads_everything() {
    let (_dir, ctx) = harness("tracking_column: id\n");
    let table = MemoryTable::new().with_rows(ids(100..=101));

    for _ in 0..2 {
        let result = run_resource(
            &ctx,
            &mut MemorySource::new(ids(1..=4)),
            &mut MemoryDestination::new(table.clone(), WriteMode::Replace),
        );
        assert_eq!(result.status, RunStatus::Success, "{:?}", result.error);
        assert_eq!(result.counts.records_read, 4);
    }
    assert_eq!(table.rows(), ids(1..=4));
    assert_eq!(ctx.state.backend.get_last_value(&pid()).unwrap(), Some(Value::Int(4)));

    let grown = run_resource(
        &ctx,
        &mut MemorySource::new(ids(1..=6)),
        &mut MemoryDestination::new(table.clone(), WriteMode::Replace),
    );
    assert_eq!(grown.counts.records_read, 6);
    assert_eq!(table.rows(), ids(1..=6));
}

#[test]
fn replace_mode_resume_keeps_rows_committed_before_the_crash() {
    let (_dir, ctx) = harness(
        "batch_size: 1\ntracking_column: id\ncheckpoint: true\nretry:\n  max_attempts: 1\n",
    );
    let table = MemoryTable::new().with_rows(ids(100..=101));
    let mut failing = ScriptedDestination::with_mode(table.clone(), WriteMode::Replace);
    failing.fail_after_writes = Some(2);

    let first = run_resource(&ctx, &mut MemorySource::new(ids(1..=5)), &mut failing);
    assert_eq!(first.status, RunStatus::Failed);
    assert_eq!(table.rows(), ids(1..=2));

    let second = run_resource(
        &ctx,
        &mut MemorySource::new(ids(1..=5)),
        &mut MemoryDestination::new(table.clone(), WriteMode::Replace),
    );
    assert_eq!(second.status, RunStatus::Success, "{:?}", second.error);
    assert_eq!(second.counts.records_read, 3);
    assert_eq!(table.rows(), ids(1..=5));
    assert!(ctx.state.checkpoints.load(&pid()).unwrap().is_none());
}

#[test]
fn auto_type_change_does_not_hide_nullability_violation() {
    let (_dir, ctx) = harness(
        "schema:\n  enabled: true\n  evolution:\n    mode: auto\n    on_type_change: auto\n",
    );
    let table = MemoryTable::with_schema(Schema::new(vec![Column::new("amount", DataType::Integer, false)]));
    let records = vec![
        Record::new().with("amount", 1.5),
        Record::new().with("amount", Value::Null),
    ];

    let result = run_resource(
        &ctx,
        &mut MemorySource::new(records),
        &mut MemoryDestination::new(table.clone(), WriteMode::Append),
    );

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.error_kind, Some("schema_incompatibility"));
    assert!(result.error.unwrap().contains("NOT NULL"));
    assert!(table.ddl_log().is_empty());
    assert_eq!(table.schema().unwrap().column("amount").unwrap().data_type, DataType::Integer);
    assert!(table.is_empty());
}

#[test]
fn manifest_metadata_records_retries_artifact_and_ddl() {
    let (_dir, ctx) = harness(
        "retry:\n  max_attempts: 3\n  base_delay_ms: 1\nschema:\n  enabled: true\n  evolution:\n    mode: auto\nquality_checks:\n  - { column: id, check: range, min: 2, action: quarantine }\n",
    );
    let table = MemoryTable::with_schema(Schema::new(vec![Column::new("id", DataType::Integer, false)]));
    let mut flaky = ScriptedDestination::new(table.clone());
    flaky.transient_failures = 2;

    let result = run_resource(&ctx, &mut MemorySource::new(ids(1..=3)), &mut flaky);

    assert_eq!(result.status, RunStatus::Partial, "{:?}", result.error);
    assert_eq!(result.counts.retries, 2);
    let entry = ctx.state.backend.latest_run(&pid()).unwrap().unwrap();
    let metadata = &entry.metadata;
    assert_eq!(metadata["retries"], 2);
    assert_eq!(metadata["records_quarantined"], 1);
    assert_eq!(
        metadata["dead_letter_artifact"].as_str(),
        result.dead_letter_location.as_deref()
    );
    assert!(metadata["dead_letter_artifact"].is_string());
    let statements = metadata["schema_statements"].as_array().unwrap();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].as_str().unwrap().contains("email"));
}

#[test]
fn strict_coercion_dead_letters_unconvertible_records() {
    let (_dir, ctx) = harness(
        "batch_size: 2\ncoercion:\n  enabled: true\n  strict: true\nquality_checks:\n  - { column: id, check: not_null, action: quarantine }\n",
    );
    let table = MemoryTable::with_schema(Schema::new(vec![
        Column::new("id", DataType::Integer, true),
        Column::new("active", DataType::Boolean, true),
    ]));
    let records = vec![
        Record::new().with("id", "1").with("active", "yes"),
        Record::new().with("id", Value::Null).with("active", "no"),
        Record::new().with("id", "3").with("active", "maybe"),
        Record::new().with("id", "4").with("active", "N/A"),
    ];

    let result = run_resource(
        &ctx,
        &mut MemorySource::new(records),
        &mut MemoryDestination::new(table.clone(), WriteMode::Append),
    );

    assert_eq!(result.status, RunStatus::Partial, "{:?}", result.error);
    assert_eq!(result.counts.records_written, 2);
    assert_eq!(result.counts.records_quarantined, 2);
    assert_eq!(
        table.rows(),
        vec![
            Record::new().with("id", 1).with("active", true),
            Record::new().with("id", 4).with("active", Value::Null),
        ]
    );

    let dead = ctx.state.backend.dead_letters(&pid(), &result.run_id).unwrap();
    let kinds: Vec<(u64, &str)> = dead.iter().map(|d| (d.row_number, d.error_kind.as_str())).collect();
    assert_eq!(kinds, vec![(2, "quality_violation"), (3, "coercion_failure")]);
    assert_eq!(dead[1].original_record.get("active"), Some(&Value::from("maybe")));
}

#[test]
fn lenient_coercion_converts_what_it_can() {
    let (_dir, ctx) = harness("coercion:\n  enabled: true\n");
    let table = MemoryTable::with_schema(Schema::new(vec![
        Column::new("id", DataType::Integer, false),
        Column::new("score", DataType::Float, true),
    ]));
    let records = vec![
        Record::new().with("id", 1).with("score", 2.5),
        Record::new().with("id", 2).with("score", "7"),
        Record::new().with("id", 3).with("score", "high"),
    ];

    let result = run_resource(
        &ctx,
        &mut MemorySource::new(records),
        &mut MemoryDestination::new(table.clone(), WriteMode::Append),
    );

    assert_eq!(result.status, RunStatus::Success, "{:?}", result.error);
    let scores: Vec<Value> = table.rows().iter().map(|r| r.get("score").cloned().unwrap()).collect();
    assert_eq!(scores, vec![Value::Float(2.5), Value::Float(7.0), Value::from("high")]);
}

#[test]
fn gaps_in_integer_tracking_column_are_counted() {
    let (_dir, ctx) = harness("tracking_column: id\ndetect_gaps: true\n");
    let records: Vec<Record> = [1, 2, 5, 6, 9].iter().map(|id| Record::new().with("id", *id)).collect();

    let result = run_resource(
        &ctx,
        &mut MemorySource::new(records),
        &mut MemoryDestination::new(MemoryTable::new(), WriteMode::Append),
    );

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.counts.tracking_gaps, 2);
    let entry = ctx.state.backend.latest_run(&pid()).unwrap().unwrap();
    assert_eq!(entry.metadata["tracking_gaps"], 2);
}

#[test]
fn interrupted_run_resumes_after_last_committed_batch() {
    let (_dir, ctx) = harness(
        "batch_size: 1\ntracking_column: id\ncheckpoint: true\nretry:\n  max_attempts: 1\n",
    );
    let table = MemoryTable::new();
    let mut failing = ScriptedDestination::new(table.clone());
    failing.fail_after_writes = Some(2);

    let first = run_resource(&ctx, &mut MemorySource::new(ids(1..=5)), &mut failing);
    assert_eq!(first.status, RunStatus::Failed);
    assert_eq!(first.error_kind, Some("write_failure"));
    let checkpoint = ctx.state.checkpoints.load(&pid()).unwrap().unwrap();
    assert_eq!(checkpoint.last_value, Value::Int(2));
    assert_eq!(checkpoint.records_so_far, 2);
    assert!(ctx.state.backend.get_last_value(&pid()).unwrap().is_none());

    let second = run_resource(
        &ctx,
        &mut MemorySource::new(ids(1..=5)),
        &mut MemoryDestination::new(table.clone(), WriteMode::Append),
    );
    assert_eq!(second.status, RunStatus::Success);
    assert_eq!(second.counts.records_read, 3);
    assert_eq!(table.len(), 5);
    assert!(ctx.state.checkpoints.load(&pid()).unwrap().is_none());
    assert_eq!(ctx.state.backend.get_last_value(&pid()).unwrap(), Some(Value::Int(5)));
}

#[test]
fn transient_write_failures_are_retried() {
    let (_dir, ctx) = harness("retry:\n  max_attempts: 3\n  base_delay_ms: 1\n");
    let table = MemoryTable::new();
    let mut flaky = ScriptedDestination::new(table.clone());
    flaky.transient_failures = 2;

    let result = run_resource(&ctx, &mut MemorySource::new(ids(1..=3)), &mut flaky);

    assert_eq!(result.status, RunStatus::Success, "{:?}", result.error);
    assert_eq!(flaky.attempts, 3);
    assert_eq!(result.counts.retries, 2);
    assert_eq!(table.len(), 3);
}

#[test]
fn exhausted_retries_report_attempts() {
    let (_dir, ctx) = harness("retry:\n  max_attempts: 2\n  base_delay_ms: 1\n");
    let mut flaky = ScriptedDestination::new(MemoryTable::new());
    flaky.transient_failures = 10;

    let result = run_resource(&ctx, &mut MemorySource::new(ids(1..=3)), &mut flaky);

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.error.unwrap().contains("after 2 attempt(s)"));
    assert_eq!(flaky.attempts, 2);
    assert_eq!(result.counts.retries, 1);
}

#[rstest]
#[case::warn_beats_quarantine("quarantine", "warn", RunStatus::Partial, 1, 0)]
#[case::quarantine_alone("quarantine", "quarantine", RunStatus::Partial, 0, 1)]
#[case::fail_aborts_over_warn("warn", "fail", RunStatus::Failed, 0, 1)]
fn governing_action_is_most_severe(
    #[case] first: &str,
    #[case] second: &str,
    #[case] status: RunStatus,
    #[case] warned: u64,
    #[case] failed: u64,
) {
    let (_dir, ctx) = harness(&format!(
        "quality_checks:\n  - {{ column: amount, check: range, min: 0, action: {first} }}\n  - {{ column: amount, check: not_in_list, values: [-5], action: {second} }}\n"
    ));
    let records = vec![Record::new().with("amount", 1), Record::new().with("amount", -5)];

    let result = run_resource(
        &ctx,
        &mut MemorySource::new(records),
        &mut MemoryDestination::new(MemoryTable::new(), WriteMode::Append),
    );

    assert_eq!(result.status, status);
    assert_eq!(result.counts.records_warned, warned);
    assert_eq!(result.counts.records_failed, failed);
}

#[test]
fn every_quarantined_record_is_dead_lettered() {
    let (_dir, ctx) = harness(
        "batch_size: 3\nquality_checks:\n  - { column: email, check: regex, pattern: '[^@]+@[^@]+', action: quarantine }\n",
    );
    let records: Vec<Record> = (1..=10)
        .map(|i| {
            let email = if i % 3 == 0 { "broken".to_string() } else { format!("u{i}@x.io") };
            Record::new().with("id", i).with("email", email)
        })
        .collect();

    let result = run_resource(
        &ctx,
        &mut MemorySource::new(records),
        &mut MemoryDestination::new(MemoryTable::new(), WriteMode::Append),
    );

    assert_eq!(result.counts.records_quarantined, 3);
    assert_eq!(result.counts.records_written, 7);
    let dead = ctx.state.backend.dead_letters(&pid(), &result.run_id).unwrap();
    assert_eq!(dead.len(), 3);
    let rows: Vec<u64> = dead.iter().map(|d| d.row_number).collect();
    assert_eq!(rows, vec![3, 6, 9]);
}

#[test]
fn dry_run_skips_ddl_and_state() {
    let (_dir, mut ctx) = harness(
        "tracking_column: id\ncheckpoint: true\nschema:\n  enabled: true\n  evolution:\n    mode: auto\n",
    );
    ctx.dry_run = true;
    let table = MemoryTable::with_schema(Schema::new(vec![Column::new("id", DataType::Integer, false)]));

    let result = run_resource(
        &ctx,
        &mut MemorySource::new(ids(1..=3)),
        &mut MemoryDestination::new(table.clone(), WriteMode::Append),
    );

    assert_eq!(result.status, RunStatus::Success, "{:?}", result.error);
    assert!(result.dry_run);
    assert_eq!(result.counts.records_written, 3);
    let plan = result.schema_plan.unwrap();
    assert_eq!(plan.statements.len(), 1);
    assert!(!plan.applied);
    assert!(table.is_empty());
    assert!(table.ddl_log().is_empty());
    assert!(ctx.state.backend.schema_history("users").unwrap().is_empty());
    assert!(ctx.state.checkpoints.load(&pid()).unwrap().is_none());
    assert!(ctx.state.backend.get_last_value(&pid()).unwrap().is_none());
    assert_eq!(ctx.state.backend.manifest_entries(Some(&pid())).unwrap().len(), 1);
}

fn pipeline_yaml(state_dir: &std::path::Path, missing_file: &std::path::Path) -> String {
    format!(
        r#"
version: "1.0"
parallelism: 2
state:
  backend: file
  path: {state}
sources:
  - name: inline
    type: memory
    config:
      records: [{{id: 1}}, {{id: 2}}, {{id: 3}}]
  - name: absent
    type: jsonl
    config:
      path: {missing}
destinations:
  - name: shared
    type: shared
resources:
  - name: broken
    source: absent
    destination: shared
  - name: users
    source: inline
    destination: shared
    tracking_column: id
"#,
        state = state_dir.display(),
        missing = missing_file.display(),
    )
}

fn shared_registry(table: &MemoryTable) -> ConnectorRegistry {
    let shared = table.clone();
    ConnectorRegistry::builtin().with_destination("shared", move |_| {
        let dest: Box<dyn Destination> = Box::new(MemoryDestination::new(shared.clone(), WriteMode::Append));
        Ok(dest)
    })
}

#[tokio::test]
async fn failed_resource_does_not_stop_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let config = parse_pipeline_str(&pipeline_yaml(dir.path(), &dir.path().join("nope.jsonl"))).unwrap();
    let table = MemoryTable::new();

    let result = run_pipeline(&config, &shared_registry(&table), &ExecutionOptions::default())
        .await
        .unwrap();

    let names: Vec<&str> = result.resources.iter().map(|r| r.resource.as_str()).collect();
    assert_eq!(names, vec!["broken", "users"]);
    assert!(result.any_failed());
    assert_eq!(result.resources[0].error_kind, Some("connection_failure"));
    assert_eq!(result.resources[1].status, RunStatus::Success);
    assert_eq!(table.len(), 3);
    assert_eq!(result.totals().records_written, 3);
}

#[tokio::test]
async fn resource_filter_runs_only_the_named_resource() {
    let dir = tempfile::tempdir().unwrap();
    let config = parse_pipeline_str(&pipeline_yaml(dir.path(), &dir.path().join("nope.jsonl"))).unwrap();
    let table = MemoryTable::new();
    let registry = shared_registry(&table);

    let result = run_pipeline(&config, &registry, &ExecutionOptions::default().with_only("users"))
        .await
        .unwrap();
    assert_eq!(result.resources.len(), 1);
    assert!(!result.any_failed());

    let err = run_pipeline(&config, &registry, &ExecutionOptions::default().with_only("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
}

#[test]
fn check_plans_ddl_without_executing_it() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        r#"
version: "1.0"
state:
  path: {state}
sources:
  - name: inline
    type: memory
    config:
      records: [{{id: 1, phone: "555-0100"}}]
  - name: absent
    type: jsonl
    config:
      path: {missing}
destinations:
  - name: shared
    type: shared
resources:
  - name: users
    source: inline
    destination: shared
    schema:
      enabled: true
      evolution:
        mode: auto
  - name: broken
    source: absent
    destination: shared
"#,
        state = dir.path().display(),
        missing = dir.path().join("nope.jsonl").display(),
    );
    let config = parse_pipeline_str(&yaml).unwrap();
    let table = MemoryTable::with_schema(Schema::new(vec![Column::new("id", DataType::Integer, false)]));
    let shared = table.clone();
    let registry = ConnectorRegistry::builtin().with_destination("shared", move |_| {
        let dest: Box<dyn Destination> = Box::new(MemoryDestination::new(shared.clone(), WriteMode::Append));
        Ok(dest)
    });

    let result = check_pipeline(&config, &registry).unwrap();

    assert!(!result.passed());
    let users = &result.resources[0];
    assert!(users.passed(), "{:?}", users.errors);
    assert_eq!(users.planned_statements.len(), 1);
    assert!(users.planned_statements[0].contains("phone"));
    assert!(table.ddl_log().is_empty());
    assert!(table.is_empty());

    let broken = &result.resources[1];
    assert!(!broken.source.is_ok());
    assert!(broken.destination.is_ok());
}

#[test]
fn custom_sources_plug_into_run_resource() {
    struct Countdown(i64);

    impl Source for Countdown {
        fn kind(&self) -> &str {
            "countdown"
        }

        fn test_connection(&mut self) -> Result<bool, ConnectorError> {
            Ok(true)
        }

        fn read(
            &mut self,
            _query: &sluice_engine::ExtractQuery,
        ) -> Result<sluice_engine::RecordStream<'_>, ConnectorError> {
            let n = self.0;
            Ok(Box::new((1..=n).rev().map(|i| Ok(Record::new().with("id", i)))))
        }
    }

    let (_dir, ctx) = harness("tracking_column: id\n");
    let table = MemoryTable::new();
    let result = run_resource(
        &ctx,
        &mut Countdown(4),
        &mut MemoryDestination::new(table.clone(), WriteMode::Append),
    );

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(ctx.state.backend.get_last_value(&pid()).unwrap(), Some(Value::Int(4)));
    let entry = ctx.state.backend.latest_run(&pid()).unwrap().unwrap();
    assert_eq!(entry.source_kind, "countdown");
}
