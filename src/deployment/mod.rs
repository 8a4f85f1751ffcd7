//! HTTP deployment of a pipeline
//!
//! Serves a pipeline as a long-running endpoint: clients invoke it with
//! `POST /invoke` and poll `GET /runs/{run_id}` until the run finishes.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::{router, DeploymentServer};
pub use state::{DeploymentState, RunRecord};
