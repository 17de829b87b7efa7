//! Shared types used across every layer

pub mod errors;
pub mod viewer;

pub use errors::{CoreError, MutationOutcome, Result};
pub use viewer::Viewer;
