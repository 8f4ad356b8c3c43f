//! Schema drift handling.
//!
//! [`EvolutionManager::plan`] turns a [`SchemaDiff`] into non-destructive DDL
//! intents according to the configured policies. [`EvolutionManager::evolve`]
//! additionally executes them in `auto` mode, snapshotting the pre-change
//! destination schema into history first. Columns are never dropped.

use serde::{Deserialize, Serialize};
use sluice_state::StateBackend;
use sluice_types::schema::{DdlStatement, Schema, SchemaDiff};

use super::{classify, TypeCompatibility};
use crate::connector::Destination;
use crate::errors::PipelineError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionMode {
    /// Emit and execute DDL.
    Auto,
    /// Emit DDL intents for an operator to run.
    #[default]
    Manual,
    /// Log drift only.
    Warn,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnNewColumn {
    #[default]
    AddNullable,
    Ignore,
    Fail,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnRemovedColumn {
    #[default]
    Ignore,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnTypeChange {
    /// Alter the destination column when the change is widening.
    Auto,
    #[default]
    Warn,
    Ignore,
    Fail,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvolutionConfig {
    #[serde(default)]
    pub mode: EvolutionMode,
    #[serde(default)]
    pub on_new_column: OnNewColumn,
    #[serde(default)]
    pub on_removed_column: OnRemovedColumn,
    #[serde(default)]
    pub on_type_change: OnTypeChange,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvolutionPlan {
    pub statements: Vec<DdlStatement>,
    /// True once every statement executed successfully.
    pub applied: bool,
}

impl EvolutionPlan {
    /// Columns an alter-type statement in this plan will change.
    #[must_use]
    pub fn altered_columns(&self) -> Vec<&str> {
        self.statements
            .iter()
            .filter(|s| matches!(s, DdlStatement::AlterColumnType { .. }))
            .map(DdlStatement::column_name)
            .collect()
    }

    #[must_use]
    pub fn rendered(&self) -> Vec<String> {
        self.statements.iter().map(ToString::to_string).collect()
    }
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Clone)]
pub struct EvolutionManager {
    config: EvolutionConfig,
}

impl EvolutionManager {
    #[must_use]
    pub fn new(config: EvolutionConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn mode(&self) -> EvolutionMode {
        self.config.mode
    }

    fn enforce_fail_policies(&self, diff: &SchemaDiff) -> Result<(), PipelineError> {
        if self.config.on_new_column == OnNewColumn::Fail && !diff.added.is_empty() {
            return Err(PipelineError::Evolution(format!(
                "new source column(s) rejected by policy: {}",
                join_names(diff.added.iter().map(|c| c.name.as_str()))
            )));
        }
        if self.config.on_removed_column == OnRemovedColumn::Fail && !diff.removed.is_empty() {
            return Err(PipelineError::Evolution(format!(
                "column(s) removed from source rejected by policy: {}",
                join_names(diff.removed.iter().map(|c| c.name.as_str()))
            )));
        }
        if self.config.on_type_change == OnTypeChange::Fail && !diff.changed.is_empty() {
            return Err(PipelineError::Evolution(format!(
                "type change(s) rejected by policy: {}",
                join_names(diff.changed.iter().map(|c| c.name.as_str()))
            )));
        }
        Ok(())
    }

    /// Derive DDL intents without executing anything.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Evolution`] when a `fail` policy matches the
    /// drift (not in `warn` mode, which only logs).
    pub fn plan(&self, table: &str, diff: &SchemaDiff) -> Result<EvolutionPlan, PipelineError> {
        let mut plan = EvolutionPlan::default();
        if diff.is_empty() {
            return Ok(plan);
        }

        if self.config.mode == EvolutionMode::Warn {
            for column in &diff.added {
                tracing::warn!(table, column = %column.name, data_type = %column.data_type, "New source column");
            }
            for column in &diff.removed {
                tracing::warn!(table, column = %column.name, "Column no longer present in source");
            }
            for change in &diff.changed {
                tracing::warn!(
                    table,
                    column = %change.name,
                    old_type = %change.old_type,
                    new_type = %change.new_type,
                    "Column type changed"
                );
            }
            return Ok(plan);
        }

        self.enforce_fail_policies(diff)?;

        if self.config.on_new_column == OnNewColumn::AddNullable {
            for column in &diff.added {
                let mut column = column.clone();
                column.nullable = true;
                plan.statements.push(DdlStatement::AddColumn {
                    table: table.to_owned(),
                    column,
                });
            }
        }

        if self.config.on_removed_column == OnRemovedColumn::Warn {
            for column in &diff.removed {
                tracing::warn!(table, column = %column.name, "Column removed from source; keeping it in destination");
            }
        }

        for change in &diff.changed {
            let widening = classify(change.old_type, change.new_type) == TypeCompatibility::Widening;
            match self.config.on_type_change {
                OnTypeChange::Auto if widening => {
                    plan.statements.push(DdlStatement::AlterColumnType {
                        table: table.to_owned(),
                        column: change.name.clone(),
                        from: change.old_type,
                        to: change.new_type,
                    });
                }
                OnTypeChange::Auto | OnTypeChange::Warn => {
                    tracing::warn!(
                        table,
                        column = %change.name,
                        old_type = %change.old_type,
                        new_type = %change.new_type,
                        widening,
                        "Column type changed; not altering destination"
                    );
                }
                OnTypeChange::Ignore | OnTypeChange::Fail => {}
            }
        }

        Ok(plan)
    }

    /// Plan and, in `auto` mode, execute. `execute = false` downgrades auto
    /// to planning only (dry runs).
    ///
    /// # Errors
    ///
    /// See [`EvolutionManager::plan`] and [`EvolutionManager::apply`].
    pub fn evolve(
        &self,
        resource: &str,
        diff: &SchemaDiff,
        current: &Schema,
        destination: &mut dyn Destination,
        history: &dyn StateBackend,
        execute: bool,
    ) -> Result<EvolutionPlan, PipelineError> {
        let plan = self.plan(resource, diff)?;
        self.apply(resource, plan, current, destination, history, execute)
    }

    /// Execute a plan produced by [`EvolutionManager::plan`] when in `auto`
    /// mode. `current` is the pre-change destination schema recorded in
    /// history.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Evolution`] on missing DDL support or DDL
    /// failure (never retried), and [`PipelineError::State`] if the history
    /// snapshot cannot be written.
    pub fn apply(
        &self,
        resource: &str,
        mut plan: EvolutionPlan,
        current: &Schema,
        destination: &mut dyn Destination,
        history: &dyn StateBackend,
        execute: bool,
    ) -> Result<EvolutionPlan, PipelineError> {
        if plan.statements.is_empty() {
            return Ok(plan);
        }
        if self.config.mode != EvolutionMode::Auto {
            tracing::info!(
                resource,
                statements = ?plan.rendered(),
                "Schema changes planned; apply manually"
            );
            return Ok(plan);
        }
        if !execute {
            tracing::info!(resource, statements = ?plan.rendered(), "Dry run: skipping schema changes");
            return Ok(plan);
        }
        if !destination.supports_ddl() {
            return Err(PipelineError::Evolution(format!(
                "{} destination does not support DDL; cannot apply {} statement(s)",
                destination.kind(),
                plan.statements.len()
            )));
        }

        let snapshot = history.append_schema_snapshot(resource, current, &plan.rendered())?;
        tracing::info!(resource, version = snapshot.version, "Recorded pre-change schema");

        for statement in &plan.statements {
            destination
                .execute_ddl(statement)
                .map_err(|e| PipelineError::Evolution(format!("{statement}: {e}")))?;
            tracing::info!(resource, statement = %statement, "Applied schema change");
        }
        plan.applied = true;
        Ok(plan)
    }
}
