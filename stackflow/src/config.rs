//! Configuration for the engine and the coordinators.

use crate::errors::ConfigError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a [`PipelineEngine`](crate::pipeline::PipelineEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Name used in logs.
    #[serde(default = "default_engine_name")]
    pub name: String,
    /// Whether a `state.entered` event is emitted for every transition.
    #[serde(default = "default_emit_state_events")]
    pub emit_state_events: bool,
}

fn default_engine_name() -> String {
    "pipeline".to_string()
}

fn default_emit_state_events() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_engine_name(),
            emit_state_events: default_emit_state_events(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the engine name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enables or disables per-transition events.
    #[must_use]
    pub fn with_state_events(mut self, enabled: bool) -> Self {
        self.emit_state_events = enabled;
        self
    }
}

/// Configuration for the [`Router`](crate::coordinators::router::Router).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// The build identifier every navigation is serialized on.
    #[serde(default = "default_router_build_id")]
    pub build_id: String,
    /// Maximum entries kept on each of the back and forward stacks.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Engine settings.
    #[serde(default = "default_router_engine")]
    pub engine: EngineConfig,
}

fn default_router_build_id() -> String {
    "router".to_string()
}

fn default_history_limit() -> usize {
    50
}

fn default_router_engine() -> EngineConfig {
    EngineConfig::new().with_name("router")
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            build_id: default_router_build_id(),
            history_limit: default_history_limit(),
            engine: default_router_engine(),
        }
    }
}

impl RouterConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the build identifier.
    #[must_use]
    pub fn with_build_id(mut self, build_id: impl Into<String>) -> Self {
        self.build_id = build_id.into();
        self
    }

    /// Sets the history bound.
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "router build_id cannot be empty".to_string(),
            ));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid(
                "history_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = read_json_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }
}

/// Configuration for the [`PanelCoordinator`](crate::coordinators::panels::PanelCoordinator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Engine settings.
    #[serde(default = "default_panel_engine")]
    pub engine: EngineConfig,
}

fn default_panel_engine() -> EngineConfig {
    EngineConfig::new().with_name("panels")
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            engine: default_panel_engine(),
        }
    }
}

impl PanelConfig {
    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json_file(path.as_ref())
    }
}

fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}
