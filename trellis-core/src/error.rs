//! Error types shared across the crate.

use thiserror::Error;

use crate::graph::NodeId;

/// Fatal errors raised by the reactive graph.
///
/// These point at a wiring mistake in the caller's graph and are never
/// recovered automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A derived computation read itself, directly or through other
    /// derived values, while it was being evaluated.
    #[error("Cyclic dependency detected. node: {node}")]
    CyclicDependency { node: NodeId },
}

/// Errors returned by [`Pipeline`](crate::pipeline::Pipeline) operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Reactive(#[from] ReactiveError),

    #[error("Pipeline source is not a writable cell. pipeline: {key}")]
    ReadOnlySource { key: String },

    #[error("Pipeline has been disposed. pipeline: {key}")]
    Disposed { key: String },
}

/// Failure reported by a user callback (filter operand, sort key, mapping).
///
/// Callbacks return this instead of panicking; the pipeline treats it as a
/// recoverable, logged failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CallbackError {
    message: String,
}

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<EvalError> for CallbackError {
    fn from(error: EvalError) -> Self {
        Self::new(error.to_string())
    }
}

impl From<PathError> for CallbackError {
    fn from(error: PathError) -> Self {
        Self::new(error.to_string())
    }
}

/// Failure to resolve a dotted property path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("Path segment not found. path: '{path}', segment: '{segment}'")]
    Missing { path: String, segment: String },

    #[error("Value is not traversable. path: '{path}', segment: '{segment}'")]
    NotTraversable { path: String, segment: String },
}

/// Failure to evaluate a template expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("Unterminated placeholder in template. template: '{template}'")]
    Unterminated { template: String },

    #[error("Empty placeholder in template. template: '{template}'")]
    EmptyPlaceholder { template: String },
}

/// Why a pipeline source could not be turned into a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("Unable to resolve source path. cause: {0}")]
    Path(#[from] PathError),

    #[error("Source nesting exceeds the configured depth. depth: {depth}")]
    TooDeep { depth: usize },
}

/// Failure to load a [`RuntimeConfig`](crate::config::RuntimeConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid runtime configuration. cause: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid runtime configuration. {field} must be greater than zero")]
    Zero { field: &'static str },
}
