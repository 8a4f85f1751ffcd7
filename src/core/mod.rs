//! Core domain models for the pipeline runtime
//!
//! This module defines steps, pipelines, their typed artifacts and
//! configuration.

pub mod artifact;
pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod state;
pub mod step;

pub use artifact::*;
pub use context::*;
pub use error::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
