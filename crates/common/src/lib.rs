//! Shared types for the invite service workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
