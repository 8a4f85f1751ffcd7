//! Step output cache

use crate::core::{Artifact, StepDefinition, StepInputs};
use anyhow::Result;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Storage for step outputs keyed by [`cache_key`]
#[async_trait::async_trait]
pub trait ArtifactCache: Send + Sync {
    /// Look up a cached artifact
    async fn load_artifact(&self, key: &str) -> Result<Option<Artifact>>;

    /// Store an artifact produced by `step_name`
    async fn save_artifact(&self, key: &str, step_name: &str, artifact: &Artifact) -> Result<()>;
}

/// Digest identifying a step invocation by step name, version, signature and inputs
pub fn cache_key(definition: &StepDefinition, inputs: &StepInputs) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(definition.name.as_bytes());
    hasher.update([0u8]);
    hasher.update(definition.version.to_le_bytes());
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(&definition.signature)?);
    hasher.update([0u8]);
    // StepInputs is ordered by input name, so this is stable
    hasher.update(serde_json::to_vec(inputs)?);

    Ok(format!("{:x}", hasher.finalize()))
}

/// In-memory cache (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryCache {
    artifacts: RwLock<HashMap<String, Artifact>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.artifacts.read().await.len()
    }
}

#[async_trait::async_trait]
impl ArtifactCache for InMemoryCache {
    async fn load_artifact(&self, key: &str) -> Result<Option<Artifact>> {
        Ok(self.artifacts.read().await.get(key).cloned())
    }

    async fn save_artifact(&self, key: &str, _step_name: &str, artifact: &Artifact) -> Result<()> {
        self.artifacts
            .write()
            .await
            .insert(key.to_string(), artifact.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArtifactType, StepSignature};

    fn echo() -> StepDefinition {
        StepDefinition::new(
            "echo",
            StepSignature::source(ArtifactType::Text).with_input("text", ArtifactType::Text),
            |inputs| Ok(Artifact::text(inputs.text("text")?)),
        )
    }

    fn inputs(text: &str) -> StepInputs {
        let mut inputs = StepInputs::new();
        inputs.insert("text", Artifact::text(text));
        inputs
    }

    #[test]
    fn test_cache_key_is_stable() {
        let a = cache_key(&echo(), &inputs("hi")).unwrap();
        let b = cache_key(&echo(), &inputs("hi")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_cache_key_depends_on_inputs_and_step() {
        let base = cache_key(&echo(), &inputs("hi")).unwrap();
        assert_ne!(base, cache_key(&echo(), &inputs("bye")).unwrap());

        let mut renamed = echo();
        renamed.name = "other".to_string();
        assert_ne!(base, cache_key(&renamed, &inputs("hi")).unwrap());

        let mut retyped = echo();
        retyped.signature.output = ArtifactType::Unit;
        assert_ne!(base, cache_key(&retyped, &inputs("hi")).unwrap());
    }

    #[test]
    fn test_cache_key_depends_on_version() {
        let v1 = cache_key(&echo(), &inputs("hi")).unwrap();
        let v2 = cache_key(&echo().with_version(2), &inputs("hi")).unwrap();
        assert_ne!(v1, v2);
        assert!(v2.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn test_in_memory_cache() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.load_artifact("k").await.unwrap(), None);

        cache.save_artifact("k", "echo", &Artifact::text("v")).await.unwrap();
        assert_eq!(cache.load_artifact("k").await.unwrap(), Some(Artifact::text("v")));
        assert_eq!(cache.len().await, 1);
    }
}
