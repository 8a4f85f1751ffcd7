//! Step domain model

use crate::core::{
    artifact::{Artifact, ArtifactType},
    error::StepError,
    state::StepState,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The function a step runs
pub type StepFn = Arc<dyn Fn(&StepInputs) -> Result<Artifact, StepError> + Send + Sync>;

/// A declared step input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ArtifactType,
}

/// Input/output type signature of a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSignature {
    pub inputs: Vec<InputSpec>,
    pub output: ArtifactType,
}

impl StepSignature {
    /// A signature with no inputs
    pub fn source(output: ArtifactType) -> Self {
        Self {
            inputs: Vec::new(),
            output,
        }
    }

    /// Add a declared input
    pub fn with_input(mut self, name: impl Into<String>, ty: ArtifactType) -> Self {
        self.inputs.push(InputSpec {
            name: name.into(),
            ty,
        });
        self
    }

    /// Look up a declared input by name
    pub fn input(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|i| i.name == name)
    }
}

impl fmt::Display for StepSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: Vec<String> = self
            .inputs
            .iter()
            .map(|i| format!("{}: {}", i.name, i.ty))
            .collect();
        write!(f, "({}) -> {}", inputs.join(", "), self.output)
    }
}

/// Resolved input values for one step invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInputs(BTreeMap<String, Artifact>);

impl StepInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Artifact) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.0.get(name)
    }

    /// Get a text input, failing if it is missing or not text
    pub fn text(&self, name: &str) -> Result<&str, StepError> {
        let value = self
            .get(name)
            .ok_or_else(|| StepError::MissingInput(name.to_string()))?;
        value.as_text().ok_or_else(|| StepError::InvalidInput {
            name: name.to_string(),
            expected: ArtifactType::Text,
            actual: value.artifact_type(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Artifact)> {
        self.0.iter()
    }
}

/// A named function registered as a pipeline step
#[derive(Clone)]
pub struct StepDefinition {
    /// Step name
    pub name: String,

    /// Declared input/output types
    pub signature: StepSignature,

    /// Whether outputs of this step may be reused from the cache
    pub cacheable: bool,

    /// Implementation version; bump it when the function's behavior changes
    /// so cached outputs of the old body are not replayed
    pub version: u32,

    func: StepFn,
}

impl StepDefinition {
    /// Register a function as a step.
    ///
    /// Steps with a unit output are not cacheable by default: they have no
    /// artifact to reuse, so a cache hit would silently drop their effect.
    pub fn new<F>(name: impl Into<String>, signature: StepSignature, func: F) -> Self
    where
        F: Fn(&StepInputs) -> Result<Artifact, StepError> + Send + Sync + 'static,
    {
        let cacheable = signature.output != ArtifactType::Unit;
        Self {
            name: name.into(),
            signature,
            cacheable,
            version: 1,
            func: Arc::new(func),
        }
    }

    /// Override the default caching behavior for this step
    pub fn with_cache(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Check inputs against the signature, run the function and check its output
    pub fn invoke(&self, inputs: &StepInputs) -> Result<Artifact, StepError> {
        for spec in &self.signature.inputs {
            let value = inputs
                .get(&spec.name)
                .ok_or_else(|| StepError::MissingInput(spec.name.clone()))?;
            if value.artifact_type() != spec.ty {
                return Err(StepError::InvalidInput {
                    name: spec.name.clone(),
                    expected: spec.ty,
                    actual: value.artifact_type(),
                });
            }
        }

        let output = (self.func)(inputs)?;

        if output.artifact_type() != self.signature.output {
            return Err(StepError::InvalidOutput {
                expected: self.signature.output,
                actual: output.artifact_type(),
            });
        }

        Ok(output)
    }
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("cacheable", &self.cacheable)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// A step placed in a pipeline
#[derive(Debug, Clone)]
pub struct Step {
    /// Unique step identifier within the pipeline
    pub id: String,

    /// The registered step
    pub definition: StepDefinition,

    /// Input name -> upstream step id
    pub bindings: BTreeMap<String, String>,

    /// Runtime state
    pub state: StepState,
}

impl Step {
    pub fn new(id: impl Into<String>, definition: StepDefinition) -> Self {
        Self {
            id: id.into(),
            definition,
            bindings: BTreeMap::new(),
            state: StepState::Pending,
        }
    }

    /// Upstream step ids this step depends on
    pub fn dependencies(&self) -> impl Iterator<Item = &String> {
        self.bindings.values()
    }

    /// Output of this step, if it completed
    pub fn output(&self) -> Option<&Artifact> {
        match &self.state {
            StepState::Completed { output, .. } => Some(output),
            _ => None,
        }
    }
}
