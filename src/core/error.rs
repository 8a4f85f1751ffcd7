//! Error types for step and pipeline operations

use crate::core::artifact::ArtifactType;
use thiserror::Error;

/// Errors raised while running a single step
#[derive(Debug, Error)]
pub enum StepError {
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("missing input '{0}'")]
    MissingInput(String),

    #[error("input '{name}' expected {expected}, got {actual}")]
    InvalidInput {
        name: String,
        expected: ArtifactType,
        actual: ArtifactType,
    },

    #[error("step returned {actual}, declared {expected}")]
    InvalidOutput {
        expected: ArtifactType,
        actual: ArtifactType,
    },

    #[error("step panicked: {0}")]
    Panicked(String),
}

/// Errors raised while building or executing a pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline name must not be empty")]
    EmptyName,

    #[error("duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("step '{step}' binds input '{input}' to unknown step '{upstream}'")]
    UnknownUpstream {
        step: String,
        input: String,
        upstream: String,
    },

    #[error("step '{step}' has no input named '{input}'")]
    UnknownInput { step: String, input: String },

    #[error("step '{step}' input '{input}' is not bound to any step")]
    UnboundInput { step: String, input: String },

    #[error("step '{step}' input '{input}' cannot consume the unit output of '{upstream}'")]
    UnitBinding {
        step: String,
        input: String,
        upstream: String,
    },

    #[error("step '{step}' input '{input}' expects {expected} but '{upstream}' produces {actual}")]
    TypeMismatch {
        step: String,
        input: String,
        upstream: String,
        expected: ArtifactType,
        actual: ArtifactType,
    },

    #[error("dependency cycle detected at step '{0}'")]
    Cycle(String),

    #[error("step {0} not found")]
    UnknownStep(String),

    #[error("step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },
}
