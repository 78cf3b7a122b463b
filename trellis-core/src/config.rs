//! Runtime Configuration
//!
//! Limits that guard the runtime against runaway graphs. The configuration
//! is per thread, like the runtime itself, and is installed with
//! [`configure`](crate::reactive::configure).

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for the reactive runtime and the collection pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// How many rounds a single flush may run before it gives up.
    ///
    /// Effects that write cells they (transitively) read re-queue themselves;
    /// a flush that still has pending effects after this many rounds logs a
    /// warning and drops the queue.
    pub max_flush_rounds: usize,

    /// How deeply function sources may return further function sources.
    pub max_source_depth: usize,
}

impl RuntimeConfig {
    pub const DEFAULT_MAX_FLUSH_ROUNDS: usize = 100;
    pub const DEFAULT_MAX_SOURCE_DEPTH: usize = 8;

    /// Parse a configuration from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_flush_rounds == 0 {
            return Err(ConfigError::Zero {
                field: "maxFlushRounds",
            });
        }
        if self.max_source_depth == 0 {
            return Err(ConfigError::Zero {
                field: "maxSourceDepth",
            });
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_rounds: Self::DEFAULT_MAX_FLUSH_ROUNDS,
            max_source_depth: Self::DEFAULT_MAX_SOURCE_DEPTH,
        }
    }
}
