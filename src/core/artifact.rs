//! Typed values passed between steps

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a step input or output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    /// A text value
    Text,
    /// No value (the step only has side effects)
    Unit,
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactType::Text => write!(f, "text"),
            ArtifactType::Unit => write!(f, "unit"),
        }
    }
}

/// A value produced by a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Artifact {
    Text(String),
    Unit,
}

impl Artifact {
    /// Create a text artifact
    pub fn text(value: impl Into<String>) -> Self {
        Artifact::Text(value.into())
    }

    /// The type of this artifact
    pub fn artifact_type(&self) -> ArtifactType {
        match self {
            Artifact::Text(_) => ArtifactType::Text,
            Artifact::Unit => ArtifactType::Unit,
        }
    }

    /// Borrow the text value, if this is a text artifact
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Artifact::Text(value) => Some(value),
            Artifact::Unit => None,
        }
    }
}
