//! The `hello-world` pipeline: `hello` feeds `print_output`

use crate::core::config::{DeploymentSettings, PipelineConfig};
use crate::core::{Pipeline, PipelineError};
use crate::steps::{hello_step, print_output_step, OutputSink};

/// Deployment settings used when the pipeline is served over HTTP.
///
/// The keep-alive timeout keeps connections open while a client polls
/// long-running deployment status.
pub fn deploy_settings() -> DeploymentSettings {
    DeploymentSettings::default()
}

/// Build the hello-world pipeline with the name, cache flag and settings from `config`
pub fn hello_world_pipeline(
    config: &PipelineConfig,
    sink: OutputSink,
) -> Result<Pipeline, PipelineError> {
    Pipeline::builder(config.name.clone())
        .enable_cache(config.enable_cache)
        .settings(config.settings.clone())
        .step(hello_step())
        .step_with(print_output_step(sink), [("message", "hello")])
        .build()
}
