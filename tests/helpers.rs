//! Shared helpers for integration tests

#![allow(dead_code)]

use hello_pipeline::core::config::PipelineConfig;
use hello_pipeline::execution::{ArtifactCache, ExecutionEngine, ExecutionEvent};
use hello_pipeline::steps::sink::CapturedOutput;
use hello_pipeline::{hello_world_pipeline, OutputSink, Pipeline, PipelineError};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Result of running the hello-world pipeline against a captured sink
pub struct TestRun {
    pub pipeline: Pipeline,
    pub result: Result<(), PipelineError>,
    pub output: CapturedOutput,
    pub events: Vec<ExecutionEvent>,
}

impl TestRun {
    pub fn step_cached(&self, step_id: &str) -> bool {
        self.pipeline
            .step(step_id)
            .map(|s| s.state.is_cached())
            .unwrap_or(false)
    }
}

/// Engine that records every event it emits
pub async fn recording_engine(
    cache: Option<Arc<dyn ArtifactCache>>,
) -> (ExecutionEngine, Arc<Mutex<Vec<ExecutionEvent>>>) {
    let engine = match cache {
        Some(cache) => ExecutionEngine::with_cache(cache),
        None => ExecutionEngine::new(),
    };
    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = events.clone();
    engine
        .add_event_handler(move |event| recorded.lock().unwrap().push(event))
        .await;
    (engine, events)
}

/// Build and run the hello-world pipeline, capturing what it prints
pub async fn run_hello_world(
    config: &PipelineConfig,
    cache: Option<Arc<dyn ArtifactCache>>,
) -> TestRun {
    let (sink, output) = OutputSink::memory();
    let mut pipeline = hello_world_pipeline(config, sink).unwrap();
    let (engine, events) = recording_engine(cache).await;
    let result = engine.execute(&mut pipeline).await;
    let events = events.lock().unwrap().clone();

    TestRun {
        pipeline,
        result,
        output,
        events,
    }
}

/// Writer whose reader has gone away
pub struct ClosedStream;

impl Write for ClosedStream {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"))
    }
}
