//! Request and response bodies of the deployment API

use crate::core::config::DeploymentSettings;
use crate::core::{ExecutionStatus, StepSignature};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `GET /info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInfo {
    pub name: String,
    pub enable_cache: bool,
    pub steps: Vec<StepInfo>,
    pub deployment: DeploymentSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub id: String,
    pub signature: StepSignature,
    /// Input name -> upstream step id
    pub inputs_from: std::collections::BTreeMap<String, String>,
}

/// `POST /invoke`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub run_id: Uuid,
    pub status: ExecutionStatus,
}
