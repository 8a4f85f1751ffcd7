//! Shared server state: the served pipeline and the runs it has started

use crate::core::config::DeploymentSettings;
use crate::core::{Artifact, ExecutionStatus, Pipeline, StepState};
use crate::execution::{ExecutionEngine, ExecutionEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Number of finished runs kept for status queries by default
pub const DEFAULT_RUN_RETENTION: usize = 100;

/// Status of one step within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: String,
    #[serde(flatten)]
    pub state: StepState,
}

/// Status of one invocation of the served pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub pipeline_name: String,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepRecord>,
    pub error: Option<String>,
}

impl RunRecord {
    fn snapshot(pipeline: &Pipeline, created_at: DateTime<Utc>, error: Option<String>) -> Self {
        Self {
            run_id: pipeline.state.execution_id,
            pipeline_name: pipeline.name.clone(),
            status: pipeline.state.status,
            created_at,
            started_at: pipeline.state.started_at,
            completed_at: pipeline.state.completed_at,
            steps: pipeline
                .ordered_steps()
                .map(|s| StepRecord {
                    id: s.id.clone(),
                    state: s.state.clone(),
                })
                .collect(),
            error,
        }
    }

    /// Output of a completed step in this run
    pub fn step_output(&self, step_id: &str) -> Option<&Artifact> {
        self.steps
            .iter()
            .find(|s| s.id == step_id)
            .and_then(|s| match &s.state {
                StepState::Completed { output, .. } => Some(output),
                _ => None,
            })
    }

    /// Fold an engine event into the record while the run is in progress
    pub fn apply(&mut self, event: ExecutionEvent) {
        let now = Utc::now();
        match event {
            ExecutionEvent::PipelineStarted { .. } => {
                self.status = ExecutionStatus::Running;
                self.started_at.get_or_insert(now);
            }
            ExecutionEvent::StepStarted { step_id } => {
                self.set_step(&step_id, |_| StepState::Running { started_at: now });
            }
            ExecutionEvent::StepCached { step_id, output } => {
                self.set_step(&step_id, |prev| StepState::Completed {
                    output,
                    cached: true,
                    started_at: started_at(prev, now),
                    completed_at: now,
                });
            }
            ExecutionEvent::StepCompleted { step_id, output } => {
                self.set_step(&step_id, |prev| StepState::Completed {
                    output,
                    cached: false,
                    started_at: started_at(prev, now),
                    completed_at: now,
                });
            }
            ExecutionEvent::StepFailed { step_id, error } => {
                self.set_step(&step_id, |prev| StepState::Failed {
                    error,
                    started_at: started_at(prev, now),
                    failed_at: now,
                });
            }
            ExecutionEvent::StepSkipped { step_id, reason } => {
                self.set_step(&step_id, |_| StepState::Skipped { reason });
            }
            // Finalized from the pipeline snapshot once the engine returns
            ExecutionEvent::PipelineCompleted { .. } => {}
        }
    }

    fn set_step<F>(&mut self, step_id: &str, next: F)
    where
        F: FnOnce(&StepState) -> StepState,
    {
        if let Some(step) = self.steps.iter_mut().find(|s| s.id == step_id) {
            step.state = next(&step.state);
        }
    }
}

fn started_at(state: &StepState, fallback: DateTime<Utc>) -> DateTime<Utc> {
    match state {
        StepState::Running { started_at } => *started_at,
        _ => fallback,
    }
}

/// State shared by all request handlers
pub struct DeploymentState {
    pipeline: Pipeline,
    settings: DeploymentSettings,
    run_retention: usize,
    runs: RwLock<HashMap<Uuid, RunRecord>>,
}

impl DeploymentState {
    /// Serve `pipeline`; its own deployment settings win over `fallback`
    pub fn new(pipeline: Pipeline, fallback: DeploymentSettings) -> Self {
        let settings = pipeline.settings.deployment.clone().unwrap_or(fallback);
        Self {
            pipeline,
            settings,
            run_retention: DEFAULT_RUN_RETENTION,
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Keep at most `limit` finished runs (at least one); runs still in
    /// progress are never evicted
    pub fn with_run_retention(mut self, limit: usize) -> Self {
        self.run_retention = limit.max(1);
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn settings(&self) -> &DeploymentSettings {
        &self.settings
    }

    /// Register a new run and execute it in the background
    pub async fn start_run(self: &Arc<Self>) -> RunRecord {
        let pipeline = self.pipeline.fresh_run();
        let created_at = Utc::now();
        let record = RunRecord::snapshot(&pipeline, created_at, None);
        self.runs.write().await.insert(record.run_id, record.clone());

        let state = Arc::clone(self);
        tokio::spawn(async move {
            state.execute_run(pipeline, created_at).await;
        });

        record
    }

    async fn execute_run(&self, mut pipeline: Pipeline, created_at: DateTime<Utc>) {
        let run_id = pipeline.state.execution_id;

        let engine = ExecutionEngine::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine
            .add_event_handler(move |event| {
                let _ = tx.send(event);
            })
            .await;

        let execute = async {
            let result = engine.execute(&mut pipeline).await;
            // The event stream ends once the engine and its sender are gone
            drop(engine);
            result
        };
        let track = async {
            while let Some(event) = rx.recv().await {
                self.record_event(run_id, event).await;
            }
        };
        let (result, ()) = tokio::join!(execute, track);

        let error = match result {
            Ok(()) => {
                info!("Run {} completed", run_id);
                None
            }
            Err(e) => {
                error!("Run {} failed: {}", run_id, e);
                Some(e.to_string())
            }
        };

        let record = RunRecord::snapshot(&pipeline, created_at, error);
        let mut runs = self.runs.write().await;
        runs.insert(run_id, record);
        self.evict_finished_runs(&mut runs);
    }

    async fn record_event(&self, run_id: Uuid, event: ExecutionEvent) {
        if let Some(record) = self.runs.write().await.get_mut(&run_id) {
            record.apply(event);
        }
    }

    /// Drop the oldest finished runs beyond the retention limit
    fn evict_finished_runs(&self, runs: &mut HashMap<Uuid, RunRecord>) {
        let mut finished: Vec<(DateTime<Utc>, Uuid)> = runs
            .values()
            .filter(|r| r.status.is_finished())
            .map(|r| (r.created_at, r.run_id))
            .collect();
        if finished.len() <= self.run_retention {
            return;
        }

        finished.sort();
        let excess = finished.len() - self.run_retention;
        for (_, run_id) in finished.into_iter().take(excess) {
            debug!("Evicting run {}", run_id);
            runs.remove(&run_id);
        }
    }

    pub async fn get_run(&self, run_id: Uuid) -> Option<RunRecord> {
        self.runs.read().await.get(&run_id).cloned()
    }

    /// All retained runs, newest first
    pub async fn list_runs(&self) -> Vec<RunRecord> {
        let mut runs: Vec<RunRecord> = self.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs
    }
}
