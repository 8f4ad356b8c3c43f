//! Execution options for pipeline runs.

/// Runtime execution options (not part of pipeline YAML config).
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Read and validate everything, but write nothing and persist only the
    /// manifest entry.
    pub dry_run: bool,
    /// Run only the named resource.
    pub only: Option<String>,
}

impl ExecutionOptions {
    #[must_use]
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            only: None,
        }
    }

    #[must_use]
    pub fn with_only(mut self, resource: impl Into<String>) -> Self {
        self.only = Some(resource.into());
        self
    }

    /// Whether `resource` is selected by the filter.
    #[must_use]
    pub fn selects(&self, resource: &str) -> bool {
        self.only.as_deref().map_or(true, |only| only == resource)
    }
}
