//! The steps of the hello-world pipeline

pub mod hello;
pub mod print_output;
pub mod sink;

pub use hello::{hello, hello_step, GREETING};
pub use print_output::{print_output, print_output_step};
pub use sink::{CapturedOutput, OutputSink};
