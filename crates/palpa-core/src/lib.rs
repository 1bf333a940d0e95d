//! # Palpa-Core
//!
//! Core types, taxonomies and the error model for the pulse and palpation
//! diagnostic engine.

pub mod error;
pub mod taxonomy;
pub mod types;

pub use error::{Error, Result};
pub use taxonomy::*;
pub use types::*;
