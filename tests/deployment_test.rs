//! The hello-world pipeline served over HTTP

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use hello_pipeline::core::config::{DeploymentSettings, PipelineConfig};
use hello_pipeline::core::{ArtifactType, StepSignature};
use hello_pipeline::deployment::router;
use hello_pipeline::steps::{hello_step, CapturedOutput};
use hello_pipeline::{
    deploy_settings, hello_world_pipeline, Artifact, DeploymentServer, DeploymentState,
    OutputSink, Pipeline, StepDefinition,
};
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::ServiceExt;

fn deployed_state(settings: DeploymentSettings) -> (Arc<DeploymentState>, CapturedOutput) {
    let (sink, output) = OutputSink::memory();
    let mut config = PipelineConfig::deployed();
    config.settings.deployment = Some(settings.clone());
    let pipeline = hello_world_pipeline(&config, sink).unwrap();
    (Arc::new(DeploymentState::new(pipeline, settings)), output)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn invoke(app: &Router) -> String {
    let (status, body) = send(app, Request::post("/invoke").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    body["run_id"].as_str().unwrap().to_string()
}

/// Poll a run until it reaches a finished status
async fn wait_for_run(app: &Router, run_id: &str) -> Value {
    for _ in 0..100 {
        let uri = format!("/runs/{}", run_id);
        let (status, body) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        if matches!(body["status"].as_str(), Some("Completed") | Some("Failed")) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("run {} did not finish", run_id);
}

#[tokio::test]
async fn test_info_reports_deploy_settings() {
    let (state, _) = deployed_state(deploy_settings());
    let app = router(state);

    let (status, info) = send(&app, Request::get("/info").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["name"], "hello-world");
    assert_eq!(info["enable_cache"], false);
    assert_eq!(info["deployment"]["host"], "0.0.0.0");
    assert_eq!(info["deployment"]["port"], 8000);
    assert_eq!(info["deployment"]["keep_alive_timeout_seconds"], 120);

    let steps: Vec<&str> = info["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(steps, vec!["hello", "print_output"]);
    assert_eq!(info["steps"][1]["inputs_from"]["message"], "hello");
}

#[tokio::test]
async fn test_invoke_runs_pipeline() {
    let (state, output) = deployed_state(deploy_settings());
    let app = router(state.clone());

    let run_id = invoke(&app).await;
    let run = wait_for_run(&app, &run_id).await;

    assert_eq!(run["status"], "Completed");
    assert_eq!(run["pipeline_name"], "hello-world");
    assert!(run["error"].is_null());
    assert_eq!(run["steps"][0]["id"], "hello");
    assert_eq!(run["steps"][0]["state"], "completed");
    assert_eq!(run["steps"][0]["output"]["value"], "Hello from ZenML!");
    assert_eq!(run["steps"][0]["cached"], false);
    assert_eq!(output.lines(), vec!["Hello from ZenML!".to_string()]);

    let record = state.get_run(run_id.parse().unwrap()).await.unwrap();
    assert_eq!(
        record.step_output("hello").and_then(|a| a.as_text()),
        Some("Hello from ZenML!")
    );
}

#[tokio::test]
async fn test_repeated_invocations_never_cache() {
    let (state, output) = deployed_state(deploy_settings());
    let app = router(state);

    let first = invoke(&app).await;
    wait_for_run(&app, &first).await;
    let second = invoke(&app).await;
    let run = wait_for_run(&app, &second).await;

    assert_ne!(first, second);
    assert_eq!(run["steps"][0]["cached"], false);
    assert_eq!(output.lines().len(), 2);

    let (status, runs) = send(&app, Request::get("/runs").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(runs.as_array().unwrap().len(), 2);
}

async fn get(app: &Router, uri: &str) -> Value {
    let (status, body) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn test_finished_runs_are_bounded() {
    let (sink, output) = OutputSink::memory();
    let pipeline = hello_world_pipeline(&PipelineConfig::deployed(), sink).unwrap();
    let state = DeploymentState::new(pipeline, deploy_settings()).with_run_retention(3);
    let app = router(Arc::new(state));

    let mut run_ids = Vec::new();
    for _ in 0..5 {
        let run_id = invoke(&app).await;
        wait_for_run(&app, &run_id).await;
        run_ids.push(run_id);
    }

    assert_eq!(output.lines().len(), 5);
    let runs = get(&app, "/runs").await;
    let listed: Vec<&str> = runs
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["run_id"].as_str().unwrap())
        .collect();
    assert_eq!(
        listed,
        vec![run_ids[4].as_str(), run_ids[3].as_str(), run_ids[2].as_str()]
    );

    let (status, _) = send(
        &app,
        Request::get(format!("/runs/{}", run_ids[0])).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// `hello` followed by a step that blocks until released
fn gated_pipeline() -> (Pipeline, mpsc::Sender<()>) {
    let (release, gate) = mpsc::channel::<()>();
    let gate = Mutex::new(gate);
    let wait = StepDefinition::new(
        "wait",
        StepSignature::source(ArtifactType::Unit).with_input("message", ArtifactType::Text),
        move |_| {
            let _ = gate.lock().unwrap().recv_timeout(Duration::from_secs(5));
            Ok(Artifact::Unit)
        },
    );
    let pipeline = Pipeline::builder("gated")
        .enable_cache(false)
        .step(hello_step())
        .step_with(wait, [("message", "hello")])
        .build()
        .unwrap();
    (pipeline, release)
}

#[tokio::test]
async fn test_run_status_shows_live_step_states() {
    let (pipeline, release) = gated_pipeline();
    let app = router(Arc::new(DeploymentState::new(pipeline, deploy_settings())));

    let run_id = invoke(&app).await;
    let uri = format!("/runs/{}", run_id);

    let mut live = None;
    for _ in 0..100 {
        let run = get(&app, &uri).await;
        if run["steps"][1]["state"] == "running" {
            live = Some(run);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let live = live.expect("wait step never reported running");

    assert_eq!(live["status"], "Running");
    assert_eq!(live["steps"][0]["state"], "completed");
    assert_eq!(live["steps"][0]["output"]["value"], "Hello from ZenML!");
    assert!(live["completed_at"].is_null());

    release.send(()).unwrap();
    let run = wait_for_run(&app, &run_id).await;
    assert_eq!(run["status"], "Completed");
    assert_eq!(run["steps"][1]["state"], "completed");
}

/// A served deployment bound to an ephemeral local port
struct TestServer {
    addr: std::net::SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start(keep_alive_timeout_seconds: u64) -> Self {
        let settings = DeploymentSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            keep_alive_timeout_seconds,
        };
        let (state, _) = deployed_state(settings);
        let server = DeploymentServer::bind(state).await.unwrap();
        let addr = server.local_addr().unwrap();

        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async {
            let _ = stopped.await;
        }));

        Self { addr, stop, handle }
    }

    /// Open one HTTP/1.1 client connection; the handle resolves when it closes
    async fn connect(&self) -> (SendRequest<Body>, JoinHandle<hyper::Result<()>>) {
        let stream = TcpStream::connect(self.addr).await.unwrap();
        let (sender, conn) = http1::handshake(TokioIo::new(stream)).await.unwrap();
        (sender, tokio::spawn(conn))
    }

    async fn shutdown(self) {
        self.stop.send(()).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

async fn get_health(sender: &mut SendRequest<Body>) -> String {
    sender.ready().await.unwrap();
    let request = Request::get("/health")
        .header("host", "localhost")
        .body(Body::empty())
        .unwrap();
    let response = sender.send_request(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(Body::new(response.into_body()), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn test_connection_is_reused_for_several_requests() {
    let server = TestServer::start(120).await;
    let (mut sender, conn) = server.connect().await;

    for _ in 0..3 {
        assert_eq!(get_health(&mut sender).await, "OK");
        assert!(!sender.is_closed());
    }

    drop(sender);
    let _ = conn.await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_idle_connection_closed_after_keep_alive_timeout() {
    let server = TestServer::start(1).await;
    let (mut sender, conn) = server.connect().await;

    assert_eq!(get_health(&mut sender).await, "OK");
    let idle_since = Instant::now();

    tokio::time::timeout(Duration::from_secs(5), conn)
        .await
        .expect("server kept the idle connection open")
        .unwrap()
        .ok();

    let idle = idle_since.elapsed();
    assert!(idle >= Duration::from_millis(900), "closed after {:?}", idle);
    assert!(sender.is_closed());
    server.shutdown().await;
}

#[tokio::test]
async fn test_idle_connection_survives_within_keep_alive_timeout() {
    let server = TestServer::start(10).await;
    let (mut sender, conn) = server.connect().await;

    assert_eq!(get_health(&mut sender).await, "OK");
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(!conn.is_finished());
    assert!(!sender.is_closed());
    assert_eq!(get_health(&mut sender).await, "OK");

    drop(sender);
    let _ = conn.await.unwrap();
    server.shutdown().await;
}
