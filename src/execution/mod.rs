//! Pipeline execution engine

pub mod cache;
pub mod engine;
pub mod executor;

pub use cache::{cache_key, ArtifactCache, InMemoryCache};
pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::StepExecutor;
