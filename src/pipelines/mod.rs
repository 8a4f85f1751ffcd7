//! Pipeline definitions

pub mod hello_world;

pub use hello_world::{deploy_settings, hello_world_pipeline};
