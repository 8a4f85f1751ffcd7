//! Deployment server: router and keep-alive aware accept loop

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, Response};
use axum::routing::{get, post};
use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::deployment::{handlers, DeploymentState};

/// How long shutdown waits for open connections to finish
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the deployment API router
pub fn router(state: Arc<DeploymentState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %req.method(),
                uri = %req.uri(),
                version = ?req.version(),
            )
        })
        .on_response(|res: &Response<Body>, latency: Duration, _span: &tracing::Span| {
            info!(
                latency = %format!("{} ms", latency.as_millis()),
                status = %res.status().as_u16(),
                "finished processing request"
            );
        });

    let logged_routes = Router::new()
        .route("/invoke", post(handlers::runs::invoke))
        .route("/runs", get(handlers::runs::list))
        .route("/runs/{run_id}", get(handlers::runs::status))
        .route("/info", get(handlers::info::info))
        .layer(trace_layer);

    Router::new()
        .merge(logged_routes)
        .route("/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}

/// A bound deployment server
pub struct DeploymentServer {
    listener: TcpListener,
    router: Router,
    keep_alive_timeout: Duration,
}

impl DeploymentServer {
    /// Bind to the address in the state's deployment settings
    pub async fn bind(state: Arc<DeploymentState>) -> Result<Self> {
        let settings = state.settings().clone();
        let addr = settings.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        Ok(Self {
            listener,
            router: router(state),
            keep_alive_timeout: settings.keep_alive_timeout(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve connections until `shutdown` resolves, then drain open connections.
    ///
    /// Idle keep-alive connections are closed once no new request header
    /// arrives within the keep-alive timeout.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Serving on {} (keep-alive timeout {}s)",
            self.local_addr()?,
            self.keep_alive_timeout.as_secs()
        );

        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .keep_alive(true)
            .header_read_timeout(self.keep_alive_timeout);

        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    debug!("Accepted connection from {}", peer);

                    let service = TowerToHyperService::new(self.router.clone());
                    let conn = graceful.watch(builder.serve_connection(TokioIo::new(stream), service));
                    tokio::spawn(async move {
                        if let Err(e) = conn.await {
                            debug!("Connection from {} closed with error: {}", peer, e);
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        drop(self.listener);

        tokio::select! {
            _ = graceful.shutdown() => info!("All connections closed"),
            _ = tokio::time::sleep(DRAIN_TIMEOUT) => {
                warn!("Timed out waiting for connections to close");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{DeploymentSettings, PipelineConfig};
    use crate::pipelines::hello_world_pipeline;
    use crate::steps::OutputSink;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn state() -> Arc<DeploymentState> {
        let (sink, _) = OutputSink::memory();
        let pipeline = hello_world_pipeline(&PipelineConfig::deployed(), sink).unwrap();
        Arc::new(DeploymentState::new(pipeline, DeploymentSettings::default()))
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn test_unknown_run_is_404() {
        let uri = format!("/runs/{}", uuid::Uuid::new_v4());
        let response = router(state())
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_run_id_is_400() {
        let response = router(state())
            .oneshot(Request::get("/runs/not-a-uuid").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "invalid run id: not-a-uuid");
    }
}
