//! Runtime configuration.
//!
//! The only real knob is how the scheduler reaches its flush boundary. A UI
//! host with its own event loop usually keeps [`FlushMode::Manual`] and calls
//! [`Runtime::flush_jobs`](crate::Runtime::flush_jobs) once per turn; an async
//! application can hand the boundary to tokio instead.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How a requested flush gets executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// The host calls `flush_jobs` (or awaits `next_tick`) itself.
    #[default]
    Manual,

    /// A flush task is spawned on the current tokio runtime.
    Tokio,
}

/// Settings for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Where queued jobs are flushed.
    pub flush: FlushMode,

    /// Upper bound on drain passes within one flush. Jobs that keep queueing
    /// each other past this are dropped and the flush fails.
    pub max_flush_passes: usize,
}

impl RuntimeConfig {
    /// Decode a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn with_flush(mut self, flush: FlushMode) -> Self {
        self.flush = flush;
        self
    }

    pub fn with_max_flush_passes(mut self, passes: usize) -> Self {
        self.max_flush_passes = passes.max(1);
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush: FlushMode::Manual,
            max_flush_passes: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_manual() {
        let config = RuntimeConfig::default();
        assert_eq!(config.flush, FlushMode::Manual);
        assert_eq!(config.max_flush_passes, 100);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json(r#"{ "flush": "tokio" }"#).unwrap();
        assert_eq!(config.flush, FlushMode::Tokio);
        assert_eq!(config.max_flush_passes, 100);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = RuntimeConfig::from_json("{ flush: ").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn pass_budget_is_at_least_one() {
        let config = RuntimeConfig::default().with_max_flush_passes(0);
        assert_eq!(config.max_flush_passes, 1);
    }
}
