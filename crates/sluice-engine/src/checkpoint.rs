//! Resume-bound resolution and high-water-mark advancement.

use std::cmp::Ordering;

use chrono::TimeDelta;
use sluice_state::{CheckpointStore, StateBackend};
use sluice_types::state::PipelineId;
use sluice_types::value::Value;

use crate::errors::PipelineError;

/// Where the resume bound came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOrigin {
    Checkpoint,
    IncrementalState,
    InitialValue,
    /// No bound: extract everything.
    Full,
}

impl ResumeOrigin {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checkpoint => "checkpoint",
            Self::IncrementalState => "incremental_state",
            Self::InitialValue => "initial_value",
            Self::Full => "full",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    pub origin: ResumeOrigin,
    /// Extract only records strictly above this value.
    pub lower_bound: Option<Value>,
    /// Records already handled by an interrupted earlier attempt.
    pub records_so_far: u64,
}

impl ResumePoint {
    fn full() -> Self {
        Self {
            origin: ResumeOrigin::Full,
            lower_bound: None,
            records_so_far: 0,
        }
    }
}

/// Inputs to [`resolve_resume`] taken from resource config.
#[derive(Debug, Clone, Copy)]
pub struct ResumeSettings<'a> {
    pub tracking_column: Option<&'a str>,
    pub use_checkpoint: bool,
    pub incremental: bool,
    pub initial_value: Option<&'a Value>,
    pub lookback_seconds: Option<u64>,
    /// The destination rewrites its content each run, so only a checkpoint
    /// of the interrupted attempt may narrow the extract.
    pub full_refresh: bool,
}

/// Pick the extraction lower bound: checkpoint first, then the incremental
/// high-water mark (less any lookback), then the configured initial value.
/// A full refresh skips the last two.
///
/// # Errors
///
/// Returns [`PipelineError::State`] if stored state cannot be read.
pub fn resolve_resume(
    checkpoints: &dyn CheckpointStore,
    backend: &dyn StateBackend,
    pipeline: &PipelineId,
    settings: ResumeSettings<'_>,
) -> Result<ResumePoint, PipelineError> {
    let Some(column) = settings.tracking_column else {
        return Ok(ResumePoint::full());
    };

    if settings.use_checkpoint {
        if let Some(cp) = checkpoints.load(pipeline)? {
            if cp.tracking_column == column {
                tracing::info!(
                    pipeline = pipeline.as_str(),
                    last_value = %cp.last_value,
                    records_so_far = cp.records_so_far,
                    "Resuming from checkpoint"
                );
                return Ok(ResumePoint {
                    origin: ResumeOrigin::Checkpoint,
                    lower_bound: Some(cp.last_value),
                    records_so_far: cp.records_so_far,
                });
            }
            tracing::warn!(
                pipeline = pipeline.as_str(),
                checkpoint_column = %cp.tracking_column,
                tracking_column = column,
                "Ignoring checkpoint for a different tracking column"
            );
        }
    }

    if settings.full_refresh {
        tracing::info!(pipeline = pipeline.as_str(), "Full refresh: ignoring incremental bound");
        return Ok(ResumePoint::full());
    }

    if settings.incremental {
        if let Some(state) = backend.incremental_state(pipeline)? {
            let bound = match settings.lookback_seconds {
                Some(secs) if secs > 0 => apply_lookback(&state.last_value, secs),
                _ => state.last_value,
            };
            tracing::info!(
                pipeline = pipeline.as_str(),
                lower_bound = %bound,
                "Resuming from incremental state"
            );
            return Ok(ResumePoint {
                origin: ResumeOrigin::IncrementalState,
                lower_bound: Some(bound),
                records_so_far: 0,
            });
        }
    }

    if let Some(initial) = settings.initial_value {
        return Ok(ResumePoint {
            origin: ResumeOrigin::InitialValue,
            lower_bound: Some(initial.clone()),
            records_so_far: 0,
        });
    }

    Ok(ResumePoint::full())
}

/// Shift a temporal high-water mark back by `seconds`. Non-temporal values
/// are returned unchanged.
#[must_use]
pub fn apply_lookback(value: &Value, seconds: u64) -> Value {
    let Some(dt) = value.as_datetime() else {
        tracing::debug!(value = %value, "Lookback ignored for non-temporal tracking value");
        return value.clone();
    };
    let delta = i64::try_from(seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX);
    dt.checked_sub_signed(delta)
        .map_or_else(|| value.clone(), Value::DateTime)
}

/// Running maximum of tracking values seen during a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighWaterMark {
    value: Option<Value>,
}

impl HighWaterMark {
    #[must_use]
    pub fn new(initial: Option<Value>) -> Self {
        Self { value: initial }
    }

    /// Move forward if `candidate` is greater. Nulls and incomparable values
    /// are ignored.
    pub fn observe(&mut self, candidate: &Value) {
        if candidate.is_null() {
            return;
        }
        match &self.value {
            None => self.value = Some(candidate.clone()),
            Some(current) => {
                if candidate.compare_tracking(current) == Some(Ordering::Greater) {
                    self.value = Some(candidate.clone());
                }
            }
        }
    }

    #[must_use]
    pub fn get(&self) -> Option<&Value> {
        self.value.as_ref()
    }
}

/// A hole in a sequential integer tracking column: no value strictly
/// between `after` and `before` was seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingGap {
    pub after: i64,
    pub before: i64,
}

impl TrackingGap {
    #[must_use]
    pub fn missing(&self) -> u64 {
        self.before.abs_diff(self.after) - 1
    }
}

/// Find gaps among the integer tracking values a run extracted.
#[must_use]
pub fn detect_gaps(mut values: Vec<i64>) -> Vec<TrackingGap> {
    values.sort_unstable();
    values.dedup();
    values
        .windows(2)
        .filter(|pair| pair[1].abs_diff(pair[0]) > 1)
        .map(|pair| TrackingGap {
            after: pair[0],
            before: pair[1],
        })
        .collect()
}

/// Persist `candidate` as the new high-water mark unless the stored one is
/// already at or above it. Returns whether the mark moved.
///
/// # Errors
///
/// Returns [`PipelineError::State`] on storage failure.
pub fn advance_high_water_mark(
    backend: &dyn StateBackend,
    pipeline: &PipelineId,
    tracking_column: &str,
    candidate: &Value,
) -> Result<bool, PipelineError> {
    if let Some(current) = backend.get_last_value(pipeline)? {
        if candidate.compare_tracking(&current) != Some(Ordering::Greater) {
            tracing::debug!(
                pipeline = pipeline.as_str(),
                current = %current,
                candidate = %candidate,
                "High-water mark unchanged"
            );
            return Ok(false);
        }
    }
    backend.set_last_value(pipeline, tracking_column, candidate)?;
    tracing::info!(
        pipeline = pipeline.as_str(),
        tracking_column,
        last_value = %candidate,
        "High-water mark advanced"
    );
    Ok(true)
}
