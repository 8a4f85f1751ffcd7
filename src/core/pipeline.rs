//! Pipeline domain model

use crate::core::{
    artifact::ArtifactType,
    config::PipelineSettings,
    error::PipelineError,
    state::{ExecutionStatus, PipelineState, StepState},
    step::{Step, StepDefinition},
};
use std::collections::{HashMap, HashSet};

/// A pipeline definition
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Whether step outputs may be reused across runs
    pub enable_cache: bool,

    /// Settings handed to the runtime (deployment etc.)
    pub settings: PipelineSettings,

    /// Pipeline steps
    pub steps: HashMap<String, Step>,

    /// Execution state
    pub state: PipelineState,

    /// Step execution order (topological sort)
    execution_order: Vec<String>,
}

impl Pipeline {
    /// Start building a pipeline
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    /// Get a step by ID
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.get(id)
    }

    /// Get a mutable step by ID
    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.get_mut(id)
    }

    /// Steps in execution order
    pub fn ordered_steps(&self) -> impl Iterator<Item = &Step> {
        self.execution_order.iter().filter_map(|id| self.steps.get(id))
    }

    /// Check if pipeline is complete
    pub fn is_complete(&self) -> bool {
        self.steps.values().all(|s| s.state.is_terminal())
    }

    /// Check if pipeline has failed
    pub fn has_failed(&self) -> bool {
        self.state.status == ExecutionStatus::Failed
    }

    /// Get execution order (topological sort)
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// A copy of this pipeline with fresh execution state
    pub fn fresh_run(&self) -> Self {
        let mut pipeline = self.clone();
        pipeline.state = PipelineState::new();
        for step in pipeline.steps.values_mut() {
            step.state = StepState::Pending;
        }
        pipeline
    }
}

/// Registers steps and their bindings, then validates them into a [`Pipeline`]
#[derive(Debug)]
pub struct PipelineBuilder {
    name: String,
    enable_cache: bool,
    settings: PipelineSettings,
    steps: Vec<Step>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enable_cache: true,
            settings: PipelineSettings::default(),
            steps: Vec::new(),
        }
    }

    pub fn enable_cache(mut self, enable: bool) -> Self {
        self.enable_cache = enable;
        self
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Add a step with no inputs; its id is the step name
    pub fn step(self, definition: StepDefinition) -> Self {
        self.step_with(definition, std::iter::empty::<(&str, &str)>())
    }

    /// Add a step, binding each named input to the output of an upstream step id
    pub fn step_with<I, K, V>(mut self, definition: StepDefinition, bindings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut step = Step::new(definition.name.clone(), definition);
        step.bindings = bindings
            .into_iter()
            .map(|(input, upstream)| (input.into(), upstream.into()))
            .collect();
        self.steps.push(step);
        self
    }

    /// Validate the registered steps and produce a pipeline
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::EmptyName);
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.clone()) {
                return Err(PipelineError::DuplicateStep(step.id.clone()));
            }
        }

        let outputs: HashMap<&str, ArtifactType> = self
            .steps
            .iter()
            .map(|s| (s.id.as_str(), s.definition.signature.output))
            .collect();

        for step in &self.steps {
            Self::check_bindings(step, &outputs)?;
        }

        let insertion_order: Vec<String> = self.steps.iter().map(|s| s.id.clone()).collect();
        let steps: HashMap<String, Step> = self
            .steps
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        let execution_order = topological_sort(&insertion_order, &steps)?;

        Ok(Pipeline {
            name: self.name,
            enable_cache: self.enable_cache,
            settings: self.settings,
            steps,
            state: PipelineState::new(),
            execution_order,
        })
    }

    fn check_bindings(step: &Step, outputs: &HashMap<&str, ArtifactType>) -> Result<(), PipelineError> {
        for (input, upstream) in &step.bindings {
            let spec = step.definition.signature.input(input).ok_or_else(|| {
                PipelineError::UnknownInput {
                    step: step.id.clone(),
                    input: input.clone(),
                }
            })?;
            let produced = *outputs.get(upstream.as_str()).ok_or_else(|| {
                PipelineError::UnknownUpstream {
                    step: step.id.clone(),
                    input: input.clone(),
                    upstream: upstream.clone(),
                }
            })?;
            if produced == ArtifactType::Unit {
                return Err(PipelineError::UnitBinding {
                    step: step.id.clone(),
                    input: input.clone(),
                    upstream: upstream.clone(),
                });
            }
            if produced != spec.ty {
                return Err(PipelineError::TypeMismatch {
                    step: step.id.clone(),
                    input: input.clone(),
                    upstream: upstream.clone(),
                    expected: spec.ty,
                    actual: produced,
                });
            }
        }

        for spec in &step.definition.signature.inputs {
            if !step.bindings.contains_key(&spec.name) {
                return Err(PipelineError::UnboundInput {
                    step: step.id.clone(),
                    input: spec.name.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Depth-first topological sort; roots are visited in insertion order
fn topological_sort(
    insertion_order: &[String],
    steps: &HashMap<String, Step>,
) -> Result<Vec<String>, PipelineError> {
    let mut result = Vec::new();
    let mut visited = HashSet::new();
    let mut temp_visited = HashSet::new();

    for step_id in insertion_order {
        visit(step_id, steps, &mut visited, &mut temp_visited, &mut result)?;
    }

    Ok(result)
}

fn visit(
    step_id: &str,
    steps: &HashMap<String, Step>,
    visited: &mut HashSet<String>,
    temp_visited: &mut HashSet<String>,
    result: &mut Vec<String>,
) -> Result<(), PipelineError> {
    if visited.contains(step_id) {
        return Ok(());
    }
    if !temp_visited.insert(step_id.to_string()) {
        return Err(PipelineError::Cycle(step_id.to_string()));
    }

    if let Some(step) = steps.get(step_id) {
        for dep in step.dependencies() {
            visit(dep, steps, visited, temp_visited, result)?;
        }
    }

    temp_visited.remove(step_id);
    visited.insert(step_id.to_string());
    result.push(step_id.to_string());
    Ok(())
}
