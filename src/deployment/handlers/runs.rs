//! Pipeline invocation and run status handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use uuid::Uuid;

use crate::deployment::dto::InvokeResponse;
use crate::deployment::{ApiError, DeploymentState, RunRecord};

/// Starts a pipeline run in the background and returns its id.
pub async fn invoke(
    State(state): State<Arc<DeploymentState>>,
) -> (StatusCode, Json<InvokeResponse>) {
    let record = state.start_run().await;
    info!("Accepted run {}", record.run_id);

    (
        StatusCode::ACCEPTED,
        Json(InvokeResponse {
            run_id: record.run_id,
            status: record.status,
        }),
    )
}

/// Lists all runs, newest first.
pub async fn list(State(state): State<Arc<DeploymentState>>) -> Json<Vec<RunRecord>> {
    Json(state.list_runs().await)
}

/// Returns the status of one run.
pub async fn status(
    State(state): State<Arc<DeploymentState>>,
    Path(run_id): Path<String>,
) -> Result<Json<RunRecord>, ApiError> {
    let id = Uuid::parse_str(&run_id).map_err(|_| ApiError::InvalidRunId(run_id.clone()))?;
    state
        .get_run(id)
        .await
        .map(Json)
        .ok_or(ApiError::RunNotFound(run_id))
}
