//! # Palpa-Engine
//!
//! Sessions, storage and the service facade tying the signal path and the
//! diagnostic crates together.
//!
//! ## Modules
//!
//! - **config**: layered engine configuration (file plus `PALPA_*` environment)
//! - **session**: session lifecycle state machine
//! - **store**: async storage boundary with an in-memory implementation
//! - **service**: ingestion, extraction, analysis, reporting and health
//! - **telemetry**: tracing subscriber setup

pub mod config;
pub mod service;
pub mod session;
pub mod store;
pub mod telemetry;

pub use self::config::*;
pub use service::*;
pub use session::*;
pub use store::*;
