//! Configuration for the barrier service.

use serde::{Deserialize, Serialize};

use crate::errors::{FlowControlError, Result};

/// Tunables of [`crate::service::BarrierService`] and its observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarrierServiceConfig {
    /// Bind runtime ids per concrete strategy copy for nodes inside a strategy.
    #[serde(default = "default_true")]
    pub strategy_aware_positions: bool,
    /// Release still-parked waiters before a plan's barriers are deleted.
    #[serde(default = "default_true")]
    pub release_waiters_on_teardown: bool,
    /// Warn when a barrier goes down before every declared strategy copy checked in.
    #[serde(default = "default_true")]
    pub validate_strategy_concurrency: bool,
    /// Emit barrier lifecycle events to the event sink.
    #[serde(default = "default_true")]
    pub emit_events: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BarrierServiceConfig {
    fn default() -> Self {
        Self {
            strategy_aware_positions: default_true(),
            release_waiters_on_teardown: default_true(),
            validate_strategy_concurrency: default_true(),
            emit_events: default_true(),
        }
    }
}

impl BarrierServiceConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parses a YAML document. Missing keys take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| FlowControlError::Serialization(e.to_string()))
    }

    /// Sets strategy-aware position binding.
    #[must_use]
    pub fn with_strategy_aware_positions(mut self, enabled: bool) -> Self {
        self.strategy_aware_positions = enabled;
        self
    }

    /// Sets teardown release.
    #[must_use]
    pub fn with_release_waiters_on_teardown(mut self, enabled: bool) -> Self {
        self.release_waiters_on_teardown = enabled;
        self
    }

    /// Sets strategy concurrency validation.
    #[must_use]
    pub fn with_validate_strategy_concurrency(mut self, enabled: bool) -> Self {
        self.validate_strategy_concurrency = enabled;
        self
    }

    /// Sets event emission.
    #[must_use]
    pub fn with_emit_events(mut self, enabled: bool) -> Self {
        self.emit_events = enabled;
        self
    }
}
