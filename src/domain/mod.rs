//! Registries behind the dispatcher
//!
//! Tools, prompts and resources, each resolved by name once the namespace is known.

pub mod prompts;
pub mod resources;
pub mod tools;
pub mod utils;
