//! Checks that run before any record is extracted: connectivity, schema
//! compatibility and drift evolution.

use sluice_state::StateBackend;
use sluice_types::error::ConnectorError;
use sluice_types::schema::{Schema, SchemaDiff};

use crate::config::ResourceConfig;
use crate::connector::{Destination, ExtractQuery, Source};
use crate::errors::{PipelineError, Side};
use crate::retry::RetryPolicy;
use crate::schema::{
    infer, CompatibilityReport, EvolutionManager, EvolutionMode, EvolutionPlan, SchemaInference,
    SchemaValidator,
};

/// Test one side through the retry policy. Returns the retries it took.
pub(crate) fn check_connection(
    side: Side,
    policy: &RetryPolicy,
    mut test: impl FnMut() -> Result<bool, ConnectorError>,
) -> Result<u32, PipelineError> {
    let operation = format!("{side}.test_connection");
    let (ok, attempts) = policy
        .execute(&operation, &mut test)
        .map_err(|e| PipelineError::Connection { side, source: e.error })?;
    if ok {
        Ok(attempts - 1)
    } else {
        Err(PipelineError::Connection {
            side,
            source: ConnectorError::internal("CONNECTION_TEST_FAILED", "connection test reported failure"),
        })
    }
}

/// Test both endpoints through the retry policy, source first. Returns the
/// retries both sides took together.
///
/// # Errors
///
/// Returns [`PipelineError::Connection`] for the first side that fails.
pub fn test_connections(
    source: &mut dyn Source,
    destination: &mut dyn Destination,
    policy: &RetryPolicy,
) -> Result<u32, PipelineError> {
    let source_retries = check_connection(Side::Source, policy, || source.test_connection())?;
    let destination_retries = check_connection(Side::Destination, policy, || destination.test_connection())?;
    Ok(source_retries + destination_retries)
}

/// Infer a schema from the first `schema.sample_size` records of an
/// unbounded read.
fn sample_schema(resource: &ResourceConfig, source: &mut dyn Source) -> Result<SchemaInference, PipelineError> {
    let sample_query = ExtractQuery {
        query: resource.query.clone(),
        tracking_column: None,
        lower_bound: None,
    };
    let mut failure = None;
    let stream = source.read(&sample_query).map_err(PipelineError::Read)?;
    let samples = stream.map_while(|r| r.map_err(|e| failure = Some(e)).ok());
    let inference = infer(samples, resource.schema.sample_size);
    match failure {
        Some(e) => Err(PipelineError::Read(e)),
        None => Ok(inference),
    }
}

/// Schema that values are coerced to: the destination's own, or else one
/// inferred from a source sample. `None` when neither is available.
///
/// # Errors
///
/// Returns [`PipelineError::Connection`] if the destination schema cannot be
/// fetched and [`PipelineError::Read`] if sampling fails.
pub fn coercion_schema(
    resource: &ResourceConfig,
    source: &mut dyn Source,
    destination: &mut dyn Destination,
) -> Result<Option<Schema>, PipelineError> {
    let reported = destination
        .get_schema()
        .map_err(|e| PipelineError::Connection { side: Side::Destination, source: e })?;
    if reported.is_some() {
        return Ok(reported);
    }
    let inference = sample_schema(resource, source)?;
    Ok((!inference.is_no_data()).then_some(inference.schema))
}

/// Everything learned about a resource's schemas, before any change is made.
#[derive(Debug, Clone)]
pub struct SchemaCheck {
    pub inference: SchemaInference,
    /// `None` when the destination reports no schema.
    pub destination_schema: Option<Schema>,
    /// `None` when there was nothing to compare.
    pub report: Option<CompatibilityReport>,
    pub plan: EvolutionPlan,
}

impl SchemaCheck {
    /// Fail on an error-level report, or on warnings in strict mode.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SchemaIncompatibility`] with every failing issue.
    pub fn verdict(&self) -> Result<(), PipelineError> {
        match &self.report {
            Some(report) if !report.passes() => {
                Err(PipelineError::SchemaIncompatibility(report.summary()))
            }
            _ => Ok(()),
        }
    }
}

/// Infer the source schema, compare it with the destination's and plan
/// evolution. Nothing is executed. Type issues on columns an `auto` plan
/// will alter are discounted from the report.
///
/// # Errors
///
/// Returns [`PipelineError::Read`] or [`PipelineError::Connection`] when a
/// schema cannot be obtained, [`PipelineError::SchemaIncompatibility`] or
/// [`PipelineError::Evolution`] when planning is rejected by policy.
pub fn inspect_schema(
    resource: &ResourceConfig,
    source: &mut dyn Source,
    destination: &mut dyn Destination,
) -> Result<SchemaCheck, PipelineError> {
    let settings = &resource.schema;
    let inference = sample_schema(resource, source)?;

    let mut check = SchemaCheck {
        inference,
        destination_schema: None,
        report: None,
        plan: EvolutionPlan::default(),
    };

    if check.inference.is_no_data() {
        tracing::info!(resource = %resource.name, "Source returned no sample rows; skipping schema checks");
        return Ok(check);
    }
    tracing::debug!(
        resource = %resource.name,
        rows_sampled = check.inference.rows_sampled,
        columns = check.inference.schema.len(),
        "Inferred source schema"
    );

    let Some(dest_schema) = destination
        .get_schema()
        .map_err(|e| PipelineError::Connection { side: Side::Destination, source: e })?
    else {
        tracing::info!(resource = %resource.name, "Destination reports no schema; skipping validation");
        return Ok(check);
    };

    let source_schema = &check.inference.schema;
    let mut report = SchemaValidator::new(settings.strict).compare(
        source_schema,
        &dest_schema,
        &settings.required_columns,
    );
    let diff = SchemaDiff::between(source_schema, &dest_schema);
    let manager = EvolutionManager::new(settings.evolution);

    let plan = match manager.plan(&resource.name, &diff) {
        Ok(plan) => plan,
        Err(e) if !report.passes() => {
            tracing::debug!(error = %e, "Evolution also rejected; reporting incompatibility first");
            return Err(PipelineError::SchemaIncompatibility(report.summary()));
        }
        Err(e) => return Err(e),
    };

    if manager.mode() == EvolutionMode::Auto {
        report.discount_type_issues(&plan.altered_columns());
    }
    for issue in report.warnings() {
        tracing::warn!(resource = %resource.name, issue = %issue, "Schema warning");
    }

    check.destination_schema = Some(dest_schema);
    check.report = Some(report);
    check.plan = plan;
    Ok(check)
}

/// Full schema preflight for a run: inspect, enforce the verdict, then
/// apply the plan per evolution mode. Returns the plan, if one was made.
///
/// # Errors
///
/// See [`inspect_schema`], [`SchemaCheck::verdict`] and
/// [`EvolutionManager::apply`].
pub fn schema_preflight(
    resource: &ResourceConfig,
    source: &mut dyn Source,
    destination: &mut dyn Destination,
    history: &dyn StateBackend,
    execute: bool,
) -> Result<Option<EvolutionPlan>, PipelineError> {
    let check = inspect_schema(resource, source, destination)?;
    check.verdict()?;
    let Some(current) = check.destination_schema else {
        return Ok(None);
    };
    let manager = EvolutionManager::new(resource.schema.evolution);
    let plan = manager.apply(&resource.name, check.plan, &current, destination, history, execute)?;
    Ok(Some(plan))
}
