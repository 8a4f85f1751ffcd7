//! Pipeline description handler.

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::deployment::dto::{PipelineInfo, StepInfo};
use crate::deployment::DeploymentState;

/// Describes the served pipeline and its deployment settings.
pub async fn info(State(state): State<Arc<DeploymentState>>) -> Json<PipelineInfo> {
    let pipeline = state.pipeline();
    let steps = pipeline
        .ordered_steps()
        .map(|step| StepInfo {
            id: step.id.clone(),
            signature: step.definition.signature.clone(),
            inputs_from: step.bindings.clone(),
        })
        .collect();

    Json(PipelineInfo {
        name: pipeline.name.clone(),
        enable_cache: pipeline.enable_cache,
        steps,
        deployment: state.settings().clone(),
    })
}
