//! Main execution engine - orchestrates the entire pipeline run

use crate::{
    core::{Artifact, ExecutionStatus, Pipeline, PipelineContext, PipelineError, StepState},
    execution::{cache_key, ArtifactCache, StepExecutor},
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
    },
    StepStarted {
        step_id: String,
    },
    StepCached {
        step_id: String,
        output: Artifact,
    },
    StepCompleted {
        step_id: String,
        output: Artifact,
    },
    StepFailed {
        step_id: String,
        error: String,
    },
    StepSkipped {
        step_id: String,
        reason: String,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Runs pipelines step by step, consulting the cache when the pipeline enables it
pub struct ExecutionEngine {
    executor: StepExecutor,
    cache: Option<Arc<dyn ArtifactCache>>,
    event_handlers: Mutex<Vec<EventHandler>>,
}

impl ExecutionEngine {
    /// Engine without a cache; pipelines always run every step
    pub fn new() -> Self {
        Self {
            executor: StepExecutor::new(),
            cache: None,
            event_handlers: Mutex::new(Vec::new()),
        }
    }

    /// Engine that reuses step outputs from `cache` for pipelines with caching enabled
    pub fn with_cache(cache: Arc<dyn ArtifactCache>) -> Self {
        Self {
            cache: Some(cache),
            ..Self::new()
        }
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    async fn emit_event(&self, event: ExecutionEvent) {
        let handlers = self.event_handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Execute the entire pipeline.
    ///
    /// Steps run one at a time in dependency order. After a failure the
    /// remaining steps are skipped and the failure is returned.
    pub async fn execute(&self, pipeline: &mut Pipeline) -> Result<(), PipelineError> {
        let execution_id = pipeline.state.execution_id;
        let pipeline_name = pipeline.name.clone();

        info!("Starting pipeline execution: {} ({})", pipeline_name, execution_id);
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline_name.clone(),
        })
        .await;

        pipeline.state.start(pipeline.steps.len());

        let mut context = PipelineContext::new();
        let mut failure: Option<PipelineError> = None;
        let order = pipeline.execution_order().to_vec();

        for step_id in &order {
            let skip_reason = failure.as_ref().map(|e| match e {
                PipelineError::StepFailed { step, .. } => format!("step '{}' failed", step),
                other => other.to_string(),
            });

            match skip_reason {
                Some(reason) => self.mark_step_skipped(pipeline, step_id, reason).await,
                None => {
                    if let Err(e) = self.execute_step(pipeline, step_id, &mut context).await {
                        failure = Some(e);
                    }
                }
            }
            pipeline.state.update_counts(pipeline.steps.values().map(|s| &s.state));
        }

        let status = if failure.is_some() {
            pipeline.state.fail();
            ExecutionStatus::Failed
        } else {
            pipeline.state.complete();
            ExecutionStatus::Completed
        };

        info!("Pipeline execution finished: {} - {:?}", pipeline_name, status);
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        })
        .await;

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Execute a single step, or take its output from the cache
    async fn execute_step(
        &self,
        pipeline: &mut Pipeline,
        step_id: &str,
        context: &mut PipelineContext,
    ) -> Result<(), PipelineError> {
        let step = pipeline
            .step(step_id)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownStep(step_id.to_string()))?;

        let started_at = Utc::now();

        if let Some(s) = pipeline.step_mut(step_id) {
            s.state = StepState::Running { started_at };
        }
        self.emit_event(ExecutionEvent::StepStarted {
            step_id: step_id.to_string(),
        })
        .await;

        let inputs = match context.resolve_inputs(&step) {
            Ok(inputs) => inputs,
            Err(e) => {
                return Err(self
                    .mark_step_failed(pipeline, step_id, e.to_string(), started_at)
                    .await);
            }
        };

        let cache = match &self.cache {
            Some(cache) if pipeline.enable_cache && step.definition.cacheable => {
                match cache_key(&step.definition, &inputs) {
                    Ok(key) => Some((cache, key)),
                    Err(e) => {
                        warn!("Could not compute cache key for step {}: {:#}", step_id, e);
                        None
                    }
                }
            }
            _ => None,
        };

        if let Some((cache, key)) = &cache {
            match cache.load_artifact(key).await {
                Ok(Some(output)) => {
                    info!("Step {} served from cache", step_id);
                    self.mark_step_completed(pipeline, step_id, output.clone(), true, started_at);
                    context.set_step_output(step_id, output.clone());
                    self.emit_event(ExecutionEvent::StepCached {
                        step_id: step_id.to_string(),
                        output,
                    })
                    .await;
                    return Ok(());
                }
                Ok(None) => debug!("Cache miss for step {}", step_id),
                Err(e) => warn!("Cache lookup failed for step {}: {:#}", step_id, e),
            }
        }

        match self.executor.execute(&step, &inputs).await {
            Ok(output) => {
                if let Some((cache, key)) = &cache {
                    if let Err(e) = cache.save_artifact(key, &step.definition.name, &output).await {
                        warn!("Failed to cache output of step {}: {:#}", step_id, e);
                    }
                }
                self.mark_step_completed(pipeline, step_id, output.clone(), false, started_at);
                context.set_step_output(step_id, output.clone());
                self.emit_event(ExecutionEvent::StepCompleted {
                    step_id: step_id.to_string(),
                    output,
                })
                .await;
                Ok(())
            }
            Err(e) => Err(self
                .mark_step_failed(pipeline, step_id, e.to_string(), started_at)
                .await),
        }
    }

    fn mark_step_completed(
        &self,
        pipeline: &mut Pipeline,
        step_id: &str,
        output: Artifact,
        cached: bool,
        started_at: chrono::DateTime<Utc>,
    ) {
        if let Some(step) = pipeline.step_mut(step_id) {
            step.state = StepState::Completed {
                output,
                cached,
                started_at,
                completed_at: Utc::now(),
            };
        }
    }

    /// Mark a step as failed and return the error to propagate
    async fn mark_step_failed(
        &self,
        pipeline: &mut Pipeline,
        step_id: &str,
        error: String,
        started_at: chrono::DateTime<Utc>,
    ) -> PipelineError {
        if let Some(step) = pipeline.step_mut(step_id) {
            step.state = StepState::Failed {
                error: error.clone(),
                started_at,
                failed_at: Utc::now(),
            };
        }

        self.emit_event(ExecutionEvent::StepFailed {
            step_id: step_id.to_string(),
            error: error.clone(),
        })
        .await;

        PipelineError::StepFailed {
            step: step_id.to_string(),
            message: error,
        }
    }

    async fn mark_step_skipped(&self, pipeline: &mut Pipeline, step_id: &str, reason: String) {
        if let Some(step) = pipeline.step_mut(step_id) {
            step.state = StepState::Skipped {
                reason: reason.clone(),
            };
        }
        self.emit_event(ExecutionEvent::StepSkipped {
            step_id: step_id.to_string(),
            reason,
        })
        .await;
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArtifactType, StepDefinition, StepError, StepSignature};
    use crate::execution::InMemoryCache;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_source(calls: Arc<AtomicUsize>) -> StepDefinition {
        StepDefinition::new("source", StepSignature::source(ArtifactType::Text), move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Artifact::text("value"))
        })
    }

    fn failing_relay() -> StepDefinition {
        StepDefinition::new(
            "relay",
            StepSignature::source(ArtifactType::Text).with_input("text", ArtifactType::Text),
            |_| Err(StepError::Output(std::io::Error::other("disk full"))),
        )
    }

    fn sink() -> StepDefinition {
        StepDefinition::new(
            "sink",
            StepSignature::source(ArtifactType::Unit).with_input("text", ArtifactType::Text),
            |_| Ok(Artifact::Unit),
        )
    }

    #[tokio::test]
    async fn test_cache_hit_skips_execution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::builder("cached")
            .step(counting_source(calls.clone()))
            .step_with(sink(), [("text", "source")])
            .build()
            .unwrap();

        let engine = ExecutionEngine::with_cache(Arc::new(InMemoryCache::new()));

        let mut first = pipeline.fresh_run();
        engine.execute(&mut first).await.unwrap();
        let mut second = pipeline.fresh_run();
        engine.execute(&mut second).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!first.step("source").unwrap().state.is_cached());
        assert!(second.step("source").unwrap().state.is_cached());
        // Unit steps are never served from the cache
        assert!(!second.step("sink").unwrap().state.is_cached());
        assert_eq!(second.state.cached_steps, 1);
        assert_eq!(second.state.completed_steps, 2);
    }

    #[tokio::test]
    async fn test_new_step_version_misses_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache: Arc<dyn ArtifactCache> = Arc::new(InMemoryCache::new());
        let engine = ExecutionEngine::with_cache(cache);

        let v1 = Pipeline::builder("versioned")
            .step(counting_source(calls.clone()))
            .build()
            .unwrap();
        engine.execute(&mut v1.fresh_run()).await.unwrap();

        let v2 = Pipeline::builder("versioned")
            .step(counting_source(calls.clone()).with_version(2))
            .build()
            .unwrap();
        let mut run = v2.fresh_run();
        engine.execute(&mut run).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!run.step("source").unwrap().state.is_cached());
    }

    #[tokio::test]
    async fn test_cache_disabled_runs_every_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::builder("uncached")
            .enable_cache(false)
            .step(counting_source(calls.clone()))
            .build()
            .unwrap();

        let engine = ExecutionEngine::with_cache(Arc::new(InMemoryCache::new()));
        engine.execute(&mut pipeline.fresh_run()).await.unwrap();
        engine.execute(&mut pipeline.fresh_run()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_skips_remaining_steps() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut pipeline = Pipeline::builder("failing")
            .step(counting_source(calls))
            .step_with(failing_relay(), [("text", "source")])
            .step_with(sink(), [("text", "relay")])
            .build()
            .unwrap();

        let engine = ExecutionEngine::new();
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = events.clone();
        engine
            .add_event_handler(move |event| recorded.lock().unwrap().push(event))
            .await;

        let err = engine.execute(&mut pipeline).await.unwrap_err();
        assert!(matches!(err, PipelineError::StepFailed { ref step, .. } if step == "relay"));
        assert_eq!(pipeline.state.status, ExecutionStatus::Failed);
        assert!(matches!(pipeline.step("relay").unwrap().state, StepState::Failed { .. }));
        assert!(matches!(pipeline.step("sink").unwrap().state, StepState::Skipped { .. }));
        assert!(pipeline.is_complete());

        let events = events.lock().unwrap();
        assert!(events.contains(&ExecutionEvent::StepSkipped {
            step_id: "sink".to_string(),
            reason: "step 'relay' failed".to_string(),
        }));
        assert!(matches!(
            events.last(),
            Some(ExecutionEvent::PipelineCompleted {
                status: ExecutionStatus::Failed,
                ..
            })
        ));
    }
}
