//! Step executor - runs a single step function

use crate::core::{Artifact, Step, StepError, StepInputs};
use tracing::{debug, error, info};

/// Executes a single step
#[derive(Debug, Default, Clone)]
pub struct StepExecutor;

impl StepExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run the step's function on a blocking thread and return its output
    pub async fn execute(&self, step: &Step, inputs: &StepInputs) -> Result<Artifact, StepError> {
        info!("Executing step: {}", step.id);
        debug!("Inputs for step {}: {:?}", step.id, inputs);

        let definition = step.definition.clone();
        let inputs = inputs.clone();
        let result = tokio::task::spawn_blocking(move || definition.invoke(&inputs))
            .await
            .map_err(|e| StepError::Panicked(e.to_string()))?;

        match &result {
            Ok(output) => debug!("Output of step {}: {:?}", step.id, output),
            Err(e) => error!("Step {} failed: {}", step.id, e),
        }

        result
    }
}
