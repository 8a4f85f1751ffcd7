//! Pipeline context - step outputs shared during a run

use crate::core::{
    artifact::Artifact,
    error::StepError,
    step::{Step, StepInputs},
};
use std::collections::HashMap;

/// Execution context for a pipeline run
///
/// Holds outputs of completed steps so downstream steps can resolve their inputs.
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    /// Outputs from completed steps (step_id -> output)
    pub step_outputs: HashMap<String, Artifact>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output of a step
    pub fn set_step_output(&mut self, step_id: &str, output: Artifact) {
        self.step_outputs.insert(step_id.to_string(), output);
    }

    /// Get the output of a step
    pub fn get_step_output(&self, step_id: &str) -> Option<&Artifact> {
        self.step_outputs.get(step_id)
    }

    /// Build the inputs for a step from the outputs of its upstream steps
    pub fn resolve_inputs(&self, step: &Step) -> Result<StepInputs, StepError> {
        let mut inputs = StepInputs::new();
        for (input, upstream) in &step.bindings {
            let value = self
                .get_step_output(upstream)
                .ok_or_else(|| StepError::MissingInput(input.clone()))?;
            inputs.insert(input.clone(), value.clone());
        }
        Ok(inputs)
    }
}
