//! HTTP route handlers for the deployment server.

pub mod info;
pub mod runs;

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}
