//! Connector type lookup.
//!
//! Built once at startup and shared read-only. [`ConnectorRegistry::builtin`]
//! knows the `memory` and `jsonl` connectors; embedders add their own with
//! the builder methods before handing the registry to the engine.

use std::collections::BTreeMap;
use std::sync::Arc;

use sluice_types::error::ConnectorError;

use crate::connector::{Destination, Source};
use crate::connectors::{jsonl, memory, JsonlDestination, JsonlSource, MemoryDestination, MemorySource};
use crate::quality::CheckRegistry;

pub type SourceFactory =
    Arc<dyn Fn(&serde_json::Value) -> Result<Box<dyn Source>, ConnectorError> + Send + Sync>;
pub type DestinationFactory =
    Arc<dyn Fn(&serde_json::Value) -> Result<Box<dyn Destination>, ConnectorError> + Send + Sync>;

type SourceFn = fn(&serde_json::Value) -> Result<Box<dyn Source>, ConnectorError>;
type DestinationFn = fn(&serde_json::Value) -> Result<Box<dyn Destination>, ConnectorError>;

fn memory_source(config: &serde_json::Value) -> Result<Box<dyn Source>, ConnectorError> {
    Ok(Box::new(MemorySource::from_config(config)?))
}

fn jsonl_source(config: &serde_json::Value) -> Result<Box<dyn Source>, ConnectorError> {
    Ok(Box::new(JsonlSource::from_config(config)?))
}

fn memory_destination(config: &serde_json::Value) -> Result<Box<dyn Destination>, ConnectorError> {
    Ok(Box::new(MemoryDestination::from_config(config)?))
}

fn jsonl_destination(config: &serde_json::Value) -> Result<Box<dyn Destination>, ConnectorError> {
    Ok(Box::new(JsonlDestination::from_config(config)?))
}

const BUILTIN_SOURCES: &[(&str, SourceFn)] = &[
    (memory::KIND, memory_source),
    (jsonl::KIND, jsonl_source),
];

const BUILTIN_DESTINATIONS: &[(&str, DestinationFn)] = &[
    (memory::KIND, memory_destination),
    (jsonl::KIND, jsonl_destination),
];

#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    sources: BTreeMap<String, SourceFactory>,
    destinations: BTreeMap<String, DestinationFactory>,
    checks: CheckRegistry,
}

impl ConnectorRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in connector table.
    #[must_use]
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        for (kind, factory) in BUILTIN_SOURCES {
            reg.sources.insert((*kind).to_owned(), Arc::new(*factory));
        }
        for (kind, factory) in BUILTIN_DESTINATIONS {
            reg.destinations.insert((*kind).to_owned(), Arc::new(*factory));
        }
        reg
    }

    #[must_use]
    pub fn with_source<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&serde_json::Value) -> Result<Box<dyn Source>, ConnectorError> + Send + Sync + 'static,
    {
        self.sources.insert(kind.into(), Arc::new(factory));
        self
    }

    #[must_use]
    pub fn with_destination<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&serde_json::Value) -> Result<Box<dyn Destination>, ConnectorError>
            + Send
            + Sync
            + 'static,
    {
        self.destinations.insert(kind.into(), Arc::new(factory));
        self
    }

    /// Custom quality checks available to `check: custom` entries.
    #[must_use]
    pub fn with_checks(mut self, checks: CheckRegistry) -> Self {
        self.checks = checks;
        self
    }

    #[must_use]
    pub fn checks(&self) -> &CheckRegistry {
        &self.checks
    }

    #[must_use]
    pub fn has_source(&self, kind: &str) -> bool {
        self.sources.contains_key(kind)
    }

    #[must_use]
    pub fn has_destination(&self, kind: &str) -> bool {
        self.destinations.contains_key(kind)
    }

    /// Instantiate a source of type `kind`.
    ///
    /// # Errors
    ///
    /// Returns a config-category error for an unknown type or bad config.
    pub fn source(&self, kind: &str, config: &serde_json::Value) -> Result<Box<dyn Source>, ConnectorError> {
        let Some(factory) = self.sources.get(kind) else {
            return Err(ConnectorError::config(
                "UNKNOWN_CONNECTOR",
                format!("unknown source type: {kind}"),
            ));
        };
        factory(config)
    }

    /// Instantiate a destination of type `kind`.
    ///
    /// # Errors
    ///
    /// Returns a config-category error for an unknown type or bad config.
    pub fn destination(
        &self,
        kind: &str,
        config: &serde_json::Value,
    ) -> Result<Box<dyn Destination>, ConnectorError> {
        let Some(factory) = self.destinations.get(kind) else {
            return Err(ConnectorError::config(
                "UNKNOWN_CONNECTOR",
                format!("unknown destination type: {kind}"),
            ));
        };
        factory(config)
    }

    /// Registered source types, sorted.
    pub fn source_kinds(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Registered destination types, sorted.
    pub fn destination_kinds(&self) -> impl Iterator<Item = &str> {
        self.destinations.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("sources", &self.source_kinds().collect::<Vec<_>>())
            .field("destinations", &self.destination_kinds().collect::<Vec<_>>())
            .field("checks", &self.checks)
            .finish()
    }
}
