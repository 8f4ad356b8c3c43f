//! Pipeline orchestrator: preflights each resource, streams batches through
//! the quality gate into the destination, and finalizes state.

use std::sync::Arc;
use std::time::Instant;

use sluice_types::manifest::RunStatus;
use sluice_types::record::Record;
use sluice_types::state::PipelineId;
use sluice_types::value::Value;
use tokio::task::JoinSet;

use crate::checkpoint::{
    advance_high_water_mark, detect_gaps, resolve_resume, HighWaterMark, ResumeOrigin, ResumePoint,
    ResumeSettings,
};
use crate::coerce::Coercer;
use crate::config::{validate_pipeline, EndpointConfig, PipelineConfig, ResourceConfig};
use crate::connector::{Destination, ExtractQuery, Source};
use crate::dlq::DeadLetterSink;
use crate::errors::{PipelineError, Side};
use crate::execution::ExecutionOptions;
use crate::manifest::{RunArtifacts, RunTracker};
use crate::preflight::{
    check_connection, coercion_schema, inspect_schema, schema_preflight, test_connections,
};
use crate::quality::{CheckRegistry, QualityGate};
use crate::registry::ConnectorRegistry;
use crate::result::{CheckResult, ConnectionStatus, PipelineResult, ResourceCheck, ResourceResult, RunCounts};
use crate::retry::RetryPolicy;
use crate::schema::EvolutionPlan;
use crate::state::{open_state, StateHandles};

/// Dead-letter `error_kind` for quarantined records.
const QUARANTINE_KIND: &str = "quality_violation";

/// Dead-letter `error_kind` for records a strict coercer rejected.
const COERCION_KIND: &str = "coercion_failure";

/// Gaps logged individually before the rest are summarized.
const GAPS_LOGGED: usize = 5;

/// Everything one resource run needs besides its connectors.
#[derive(Debug, Clone)]
pub struct ResourceContext {
    pub resource: ResourceConfig,
    pub state: StateHandles,
    pub checks: CheckRegistry,
    pub dry_run: bool,
}

/// Mutable bookkeeping for a run in flight.
struct ResourceRun<'a> {
    ctx: &'a ResourceContext,
    pipeline: PipelineId,
    counts: RunCounts,
    dlq: DeadLetterSink,
    schema_plan: Option<EvolutionPlan>,
    dead_letter_location: Option<String>,
}

fn as_count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

impl<'a> ResourceRun<'a> {
    fn new(ctx: &'a ResourceContext) -> Self {
        Self {
            ctx,
            pipeline: PipelineId::new(&ctx.resource.name),
            counts: RunCounts::default(),
            dlq: DeadLetterSink::new(),
            schema_plan: None,
            dead_letter_location: None,
        }
    }

    fn resume_point(&self, full_refresh: bool) -> Result<ResumePoint, PipelineError> {
        let resource = &self.ctx.resource;
        resolve_resume(
            &*self.ctx.state.checkpoints,
            &*self.ctx.state.backend,
            &self.pipeline,
            ResumeSettings {
                tracking_column: resource.tracking_column.as_deref(),
                use_checkpoint: resource.checkpoint,
                incremental: resource.incremental,
                initial_value: resource.initial_value.as_ref(),
                lookback_seconds: resource.lookback_seconds,
                full_refresh,
            },
        )
    }

    /// Coerce gated records; strict rejections are dead-lettered.
    fn coerce_batch(&mut self, coercer: &Coercer, records: Vec<Record>, rows: &[u64]) -> Vec<Record> {
        let mut kept = Vec::with_capacity(records.len());
        for (record, row) in records.into_iter().zip(rows) {
            match coercer.coerce_record(&record) {
                Ok(coerced) => kept.push(coerced),
                Err(e) => {
                    tracing::debug!(row, error = %e, "Record failed coercion");
                    self.dlq.record(*row, record, COERCION_KIND, e.to_string());
                    self.counts.records_quarantined += 1;
                    self.counts.records_failed += 1;
                }
            }
        }
        kept
    }

    fn report_gaps(&mut self, column: &str, values: Vec<i64>) {
        let gaps = detect_gaps(values);
        self.counts.tracking_gaps = as_count(gaps.len());
        if gaps.is_empty() {
            return;
        }
        tracing::warn!(
            resource = %self.ctx.resource.name,
            tracking_column = column,
            gaps = gaps.len(),
            "Gaps found in tracking column"
        );
        for gap in gaps.iter().take(GAPS_LOGGED) {
            tracing::warn!(
                tracking_column = column,
                after = gap.after,
                before = gap.before,
                missing = gap.missing(),
                "Missing tracking values"
            );
        }
    }

    fn execute(
        &mut self,
        run_id: &str,
        source: &mut dyn Source,
        destination: &mut dyn Destination,
    ) -> Result<(), PipelineError> {
        let ctx = self.ctx;
        let resource = &ctx.resource;
        let gate = QualityGate::new(&resource.quality_checks, &ctx.checks)?;
        let policy = RetryPolicy::from(&resource.retry);

        // PREFLIGHT
        self.counts.retries += u64::from(test_connections(source, destination, &policy)?);
        if resource.schema.enabled {
            self.schema_plan = schema_preflight(
                resource,
                source,
                destination,
                &*ctx.state.backend,
                !ctx.dry_run,
            )?;
        }
        let coercer = if resource.coercion.enabled {
            coercion_schema(resource, source, destination)?
                .map(|schema| Coercer::new(&resource.coercion, schema))
        } else {
            None
        };
        tracing::info!(
            resource = %resource.name,
            run_id,
            coercion = coercer.is_some(),
            "Preflight passed"
        );

        // RESUME CHECK
        let resume = self.resume_point(destination.replaces_content())?;
        destination.begin_run(resume.origin == ResumeOrigin::Checkpoint);
        let query = ExtractQuery {
            query: resource.query.clone(),
            tracking_column: resource.tracking_column.clone(),
            lower_bound: resume.lower_bound.clone(),
        };
        if let Some(estimate) = source.estimate_total_records(&query) {
            tracing::info!(
                resource = %resource.name,
                origin = resume.origin.as_str(),
                estimated_records = estimate,
                "Starting extraction"
            );
        }
        let mut high_water = HighWaterMark::new(match resume.origin {
            ResumeOrigin::Checkpoint => resume.lower_bound.clone(),
            _ => None,
        });

        // EXTRACT, VALIDATE, WRITE
        let mut tracking_ints = Vec::new();
        let batch_size = resource.batch_size.max(1);
        let mut stream = source.read(&query).map_err(PipelineError::Read)?;
        loop {
            let mut batch = Vec::with_capacity(batch_size);
            for item in stream.by_ref() {
                let record = item.map_err(PipelineError::Read)?;
                if !query.matches(&record) {
                    tracing::debug!(resource = %resource.name, "Dropping record at or below resume bound");
                    continue;
                }
                batch.push(record);
                if batch.len() >= batch_size {
                    break;
                }
            }
            if batch.is_empty() {
                break;
            }

            let first_row = self.counts.records_read + 1;
            self.counts.records_read += as_count(batch.len());
            if let Some(column) = &resource.tracking_column {
                for value in batch.iter().filter_map(|r| r.get(column)) {
                    high_water.observe(value);
                    if let (true, Value::Int(n)) = (resource.detect_gaps, value) {
                        tracking_ints.push(*n);
                    }
                }
            }

            let result = gate.validate_batch(batch, first_row);
            let mut quarantined = 0;
            for invalid in result.quarantined() {
                self.dlq.record(
                    invalid.row_number,
                    invalid.record.clone(),
                    QUARANTINE_KIND,
                    invalid.message(),
                );
                quarantined += 1;
            }
            self.counts.records_quarantined += quarantined;
            self.counts.records_failed += quarantined;
            self.counts.records_warned += as_count(result.warned().count());
            if let Some(failure) = result.failure() {
                self.counts.records_failed += 1;
                return Err(PipelineError::QualityViolation {
                    row_number: failure.row_number,
                    message: failure.message(),
                });
            }

            let rows = result.valid_row_numbers(first_row);
            let mut valid = result.valid_records;
            if let Some(coercer) = &coercer {
                valid = self.coerce_batch(coercer, valid, &rows);
            }
            if !valid.is_empty() && !ctx.dry_run {
                match policy.execute("destination.write", || destination.write(&valid)) {
                    Ok(((), attempts)) => self.counts.retries += u64::from(attempts - 1),
                    Err(e) => {
                        self.counts.retries += u64::from(e.attempts - 1);
                        return Err(PipelineError::Write {
                            attempts: e.attempts,
                            source: e.error,
                        });
                    }
                }
            }
            self.counts.records_written += as_count(valid.len());
            self.counts.batches += 1;

            if resource.checkpoint && !ctx.dry_run {
                if let (Some(column), Some(last_value)) = (&resource.tracking_column, high_water.get()) {
                    ctx.state.checkpoints.save(
                        &self.pipeline,
                        column,
                        last_value,
                        resume.records_so_far + self.counts.records_read,
                    )?;
                }
            }
            tracing::info!(
                resource = %resource.name,
                run_id,
                batch = self.counts.batches,
                records = valid.len(),
                records_read = self.counts.records_read,
                dry_run = ctx.dry_run,
                "Batch written"
            );
        }
        drop(stream);

        if let (true, Some(column)) = (resource.detect_gaps, &resource.tracking_column) {
            self.report_gaps(column, tracking_ints);
        }

        if ctx.dry_run {
            tracing::info!(resource = %resource.name, run_id, "Dry run: skipping finalize and state updates");
            return Ok(());
        }

        // FINALIZE
        destination
            .finalize()
            .map_err(|e| PipelineError::Write { attempts: 1, source: e })?;
        self.dead_letter_location = self.dlq.flush(&*ctx.state.backend, &self.pipeline, run_id)?;
        if resource.incremental {
            if let (Some(column), Some(last_value)) = (&resource.tracking_column, high_water.get()) {
                advance_high_water_mark(&*ctx.state.backend, &self.pipeline, column, last_value)?;
            }
        }
        if resource.checkpoint && ctx.state.checkpoints.clear(&self.pipeline)? {
            tracing::debug!(resource = %resource.name, "Checkpoint cleared");
        }
        tracing::info!(resource = %resource.name, run_id, "Finalized");
        Ok(())
    }

    fn finish(self, tracker: RunTracker<'_>, outcome: Result<(), PipelineError>) -> ResourceResult {
        let name = self.ctx.resource.name.clone();
        let (status, error) = match outcome {
            Ok(()) if self.counts.has_quality_failures() => (RunStatus::Partial, None),
            Ok(()) => (RunStatus::Success, None),
            Err(e) => (RunStatus::Failed, Some(e)),
        };
        match &error {
            Some(e) => tracing::error!(
                resource = %name,
                run_id = %tracker.run_id(),
                kind = e.kind(),
                error = %e,
                "Resource run failed"
            ),
            None => tracing::info!(
                resource = %name,
                run_id = %tracker.run_id(),
                status = %status,
                records_read = self.counts.records_read,
                records_written = self.counts.records_written,
                records_failed = self.counts.records_failed,
                "Resource run complete"
            ),
        }

        let run_id = tracker.run_id().to_owned();
        let artifacts = RunArtifacts {
            dead_letter: self.dead_letter_location.clone(),
            schema_statements: self.schema_plan.as_ref().map(EvolutionPlan::rendered).unwrap_or_default(),
        };
        let entry = tracker.complete(status, &self.counts, &artifacts, error.as_ref());
        ResourceResult {
            run_id,
            resource: name,
            status,
            counts: self.counts,
            duration_secs: entry.duration_secs,
            error: error.as_ref().map(ToString::to_string),
            error_kind: error.as_ref().map(PipelineError::kind),
            dead_letter_location: self.dead_letter_location,
            schema_plan: self.schema_plan,
            dry_run: self.ctx.dry_run,
        }
    }
}

/// Run one resource to a terminal state. Never returns early: every outcome,
/// including preflight failures, is recorded in the manifest and reported in
/// the result.
pub fn run_resource(
    ctx: &ResourceContext,
    source: &mut dyn Source,
    destination: &mut dyn Destination,
) -> ResourceResult {
    let mut run = ResourceRun::new(ctx);
    let tracker = RunTracker::start(
        &*ctx.state.backend,
        run.pipeline.clone(),
        source.kind(),
        destination.kind(),
        ctx.dry_run,
    );
    tracing::info!(
        resource = %ctx.resource.name,
        run_id = %tracker.run_id(),
        source = source.kind(),
        destination = destination.kind(),
        dry_run = ctx.dry_run,
        "Starting resource run"
    );
    let outcome = run.execute(tracker.run_id(), source, destination);
    run.finish(tracker, outcome)
}

/// Record a run that failed before its connectors existed.
fn fail_unstarted(
    ctx: &ResourceContext,
    source_kind: &str,
    destination_kind: &str,
    error: PipelineError,
) -> ResourceResult {
    let run = ResourceRun::new(ctx);
    let tracker = RunTracker::start(
        &*ctx.state.backend,
        run.pipeline.clone(),
        source_kind,
        destination_kind,
        ctx.dry_run,
    );
    run.finish(tracker, Err(error))
}

fn build_connectors(
    registry: &ConnectorRegistry,
    source: &EndpointConfig,
    destination: &EndpointConfig,
) -> Result<(Box<dyn Source>, Box<dyn Destination>), PipelineError> {
    let src = registry
        .source(&source.kind, &source.config)
        .map_err(|e| PipelineError::Configuration(format!("source '{}': {e}", source.name)))?;
    let dst = registry
        .destination(&destination.kind, &destination.config)
        .map_err(|e| PipelineError::Configuration(format!("destination '{}': {e}", destination.name)))?;
    Ok((src, dst))
}

fn endpoints<'c>(
    config: &'c PipelineConfig,
    resource: &ResourceConfig,
) -> Result<(&'c EndpointConfig, &'c EndpointConfig), PipelineError> {
    let source = config.source(&resource.source).ok_or_else(|| {
        PipelineError::Configuration(format!("unknown source '{}'", resource.source))
    })?;
    let destination = config.destination(&resource.destination).ok_or_else(|| {
        PipelineError::Configuration(format!("unknown destination '{}'", resource.destination))
    })?;
    Ok((source, destination))
}

/// Validation shared by `run_pipeline` and `check_pipeline`: structure,
/// connector types known to `registry`, and compilable quality checks.
fn prepare(config: &PipelineConfig, registry: &ConnectorRegistry) -> Result<(), PipelineError> {
    validate_pipeline(config).map_err(|e| PipelineError::Configuration(format!("{e:#}")))?;

    let mut errors = Vec::new();
    for source in &config.sources {
        if !registry.has_source(&source.kind) {
            errors.push(format!("source '{}': unknown type '{}'", source.name, source.kind));
        }
    }
    for destination in &config.destinations {
        if !registry.has_destination(&destination.kind) {
            errors.push(format!(
                "destination '{}': unknown type '{}'",
                destination.name, destination.kind
            ));
        }
    }
    for resource in &config.resources {
        if let Err(e) = QualityGate::new(&resource.quality_checks, registry.checks()) {
            errors.push(format!("resource '{}': {e}", resource.name));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::Configuration(errors.join("; ")))
    }
}

fn execute_resource(
    registry: &ConnectorRegistry,
    source: &EndpointConfig,
    destination: &EndpointConfig,
    ctx: &ResourceContext,
) -> ResourceResult {
    match build_connectors(registry, source, destination) {
        Ok((mut src, mut dst)) => run_resource(ctx, src.as_mut(), dst.as_mut()),
        Err(e) => fail_unstarted(ctx, &source.kind, &destination.kind, e),
    }
}

/// Result for a resource whose task panicked. The run's tracker unwound with
/// the task and already recorded it as failed, so its id is not known here.
fn panicked_result(resource: String, dry_run: bool, error: &tokio::task::JoinError) -> ResourceResult {
    let error = PipelineError::Infrastructure(anyhow::anyhow!("Resource task panicked: {error}"));
    ResourceResult {
        run_id: String::new(),
        resource,
        status: RunStatus::Failed,
        counts: RunCounts::default(),
        duration_secs: 0.0,
        error: Some(error.to_string()),
        error_kind: Some(error.kind()),
        dead_letter_location: None,
        schema_plan: None,
        dry_run,
    }
}

/// Run every selected resource, at most `parallelism` at a time. A failed
/// resource does not stop its siblings.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] for an invalid config, unknown
/// connector type, or a resource filter matching nothing, and
/// [`PipelineError::State`] if state storage cannot be opened. Per-resource
/// failures are reported in the returned [`PipelineResult`].
pub async fn run_pipeline(
    config: &PipelineConfig,
    registry: &ConnectorRegistry,
    options: &ExecutionOptions,
) -> Result<PipelineResult, PipelineError> {
    let started = Instant::now();
    prepare(config, registry)?;

    let selected: Vec<(usize, &ResourceConfig)> = config
        .resources
        .iter()
        .enumerate()
        .filter(|(_, r)| options.selects(&r.name))
        .collect();
    if let (Some(only), true) = (&options.only, selected.is_empty()) {
        return Err(PipelineError::Configuration(format!("no resource named '{only}'")));
    }

    let state = open_state(&config.state)?;
    let parallelism = config.parallelism.max(1);
    let semaphore = Arc::new(tokio::sync::Semaphore::new(parallelism));
    let registry = Arc::new(registry.clone());

    tracing::info!(
        resources = selected.len(),
        parallelism,
        dry_run = options.dry_run,
        "Starting pipeline"
    );

    let mut join_set: JoinSet<(usize, ResourceResult)> = JoinSet::new();
    for (index, resource) in selected {
        let (source, destination) = endpoints(config, resource)?;
        let permit = semaphore.clone().acquire_owned().await.map_err(|e| {
            PipelineError::Infrastructure(anyhow::anyhow!("Semaphore closed: {e}"))
        })?;

        let ctx = ResourceContext {
            resource: resource.clone(),
            state: state.clone(),
            checks: registry.checks().clone(),
            dry_run: options.dry_run,
        };
        let source = source.clone();
        let destination = destination.clone();
        let registry = registry.clone();

        join_set.spawn(async move {
            let _permit = permit;
            let name = ctx.resource.name.clone();
            let dry_run = ctx.dry_run;
            let result = tokio::task::spawn_blocking(move || {
                execute_resource(&registry, &source, &destination, &ctx)
            })
            .await
            .unwrap_or_else(|e| {
                tracing::error!(resource = %name, error = %e, "Resource task panicked");
                panicked_result(name, dry_run, &e)
            });
            (index, result)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(indexed) => results.push(indexed),
            Err(join_err) => {
                return Err(PipelineError::Infrastructure(anyhow::anyhow!(
                    "Resource task join error: {join_err}"
                )));
            }
        }
    }
    results.sort_by_key(|(index, _)| *index);

    let result = PipelineResult {
        resources: results.into_iter().map(|(_, r)| r).collect(),
        duration_secs: started.elapsed().as_secs_f64(),
        parallelism,
    };
    tracing::info!(
        resources = result.resources.len(),
        failed = result.resources.iter().filter(|r| r.is_failed()).count(),
        duration_secs = result.duration_secs,
        "Pipeline complete"
    );
    Ok(result)
}

fn connection_status(outcome: Result<u32, PipelineError>) -> ConnectionStatus {
    match outcome {
        Ok(_) => ConnectionStatus::Ok,
        Err(e) => ConnectionStatus::Failed(e.to_string()),
    }
}

fn check_resource(config: &PipelineConfig, registry: &ConnectorRegistry, resource: &ResourceConfig) -> ResourceCheck {
    let mut check = ResourceCheck {
        resource: resource.name.clone(),
        source: ConnectionStatus::Ok,
        destination: ConnectionStatus::Ok,
        schema_report: None,
        planned_statements: Vec::new(),
        errors: Vec::new(),
    };
    let built = endpoints(config, resource)
        .and_then(|(source, destination)| build_connectors(registry, source, destination));
    let (mut source, mut destination) = match built {
        Ok(pair) => pair,
        Err(e) => {
            check.errors.push(e.to_string());
            return check;
        }
    };

    let policy = RetryPolicy::from(&resource.retry);
    check.source = connection_status(check_connection(Side::Source, &policy, || source.test_connection()));
    check.destination = connection_status(check_connection(Side::Destination, &policy, || {
        destination.test_connection()
    }));

    if resource.schema.enabled && check.source.is_ok() && check.destination.is_ok() {
        match inspect_schema(resource, source.as_mut(), destination.as_mut()) {
            Ok(schema) => {
                check.planned_statements = schema.plan.rendered();
                check.schema_report = schema.report;
            }
            Err(e) => check.errors.push(e.to_string()),
        }
    }
    tracing::info!(resource = %resource.name, passed = check.passed(), "Checked resource");
    check
}

/// Validate config and check every resource without extracting, writing or
/// executing DDL.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] when the config itself is
/// invalid. Connectivity and schema problems are reported per resource.
pub fn check_pipeline(
    config: &PipelineConfig,
    registry: &ConnectorRegistry,
) -> Result<CheckResult, PipelineError> {
    prepare(config, registry)?;
    Ok(CheckResult {
        resources: config
            .resources
            .iter()
            .map(|resource| check_resource(config, registry, resource))
            .collect(),
    })
}
