//! The `print_output` step

use crate::core::{Artifact, ArtifactType, StepDefinition, StepError, StepSignature};
use crate::steps::sink::OutputSink;

/// Writes `message` as one line to `sink`
pub fn print_output(message: &str, sink: &OutputSink) -> Result<(), StepError> {
    sink.write_line(message)?;
    Ok(())
}

/// `print_output` registered as a step: `(message: text) -> unit`
pub fn print_output_step(sink: OutputSink) -> StepDefinition {
    StepDefinition::new(
        "print_output",
        StepSignature::source(ArtifactType::Unit).with_input("message", ArtifactType::Text),
        move |inputs| {
            print_output(inputs.text("message")?, &sink)?;
            Ok(Artifact::Unit)
        },
    )
}
