//! Builds docker images from a small declarative descriptor: the descriptor
//! is rendered into a Dockerfile, staged in a scratch directory and handed
//! to a build engine.

pub mod backends;
pub mod builder;
pub mod config;
pub mod errors;
pub mod manifest;
pub mod models;
pub mod services;

pub use builder::Builder;
pub use errors::{Error, Result};
pub use models::{Descriptor, Instruction, ProgressEvent};
