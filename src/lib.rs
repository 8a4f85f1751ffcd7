//! hello-pipeline - the hello-world pipeline, runnable locally or as an HTTP deployment

pub mod cli;
pub mod core;
pub mod deployment;
pub mod execution;
pub mod persistence;
pub mod pipelines;
pub mod steps;

// Re-export commonly used types
pub use core::config::{DeploymentSettings, PipelineConfig, PipelineSettings};
pub use core::{Artifact, ArtifactType, ExecutionStatus, Pipeline, PipelineError, StepDefinition, StepError, StepState};
pub use deployment::{DeploymentServer, DeploymentState};
pub use execution::{ExecutionEngine, ExecutionEvent};
pub use pipelines::{deploy_settings, hello_world_pipeline};
pub use steps::{hello, print_output, OutputSink};
