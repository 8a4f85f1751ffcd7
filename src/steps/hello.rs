//! The `hello` step

use crate::core::{Artifact, ArtifactType, StepDefinition, StepSignature};

/// The text `hello` returns
pub const GREETING: &str = "Hello from ZenML!";

/// Returns the greeting
pub fn hello() -> String {
    GREETING.to_string()
}

/// `hello` registered as a step: `() -> text`
pub fn hello_step() -> StepDefinition {
    StepDefinition::new("hello", StepSignature::source(ArtifactType::Text), |_| {
        Ok(Artifact::text(hello()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StepInputs;

    #[test]
    fn test_hello_is_constant() {
        assert_eq!(hello(), "Hello from ZenML!");
        assert_eq!(hello(), hello());
    }

    #[test]
    fn test_hello_step() {
        let step = hello_step();
        assert_eq!(step.name, "hello");
        assert!(step.signature.inputs.is_empty());
        assert_eq!(step.signature.output, ArtifactType::Text);
        assert!(step.cacheable);
        assert_eq!(
            step.invoke(&StepInputs::new()).unwrap(),
            Artifact::text("Hello from ZenML!")
        );
    }
}
