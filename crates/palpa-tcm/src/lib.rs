//! # Palpa-TCM
//!
//! Diagnostic interpretation of pulse features and palpation observations.
//!
//! ## Modules
//!
//! - **classifier**: prototype-distance classification into the 28 pulse types
//! - **patterns**: static syndrome pattern table
//! - **pattern_mapper**: pulse hypotheses and symptoms to ranked patterns
//! - **findings**: finding and condition model shared by the palpation analyzers
//! - **abdominal**: nine-region abdominal palpation with adjacency correlation
//! - **skin**: eight-region skin palpation with group correlation
//! - **fusion**: multi-modality report with conflict resolution and alerts
//! - **trend**: least-squares trends and two-session comparison
//!
//! All analysis here is pure and synchronous; scheduling belongs to the
//! engine crate.

pub mod abdominal;
pub mod classifier;
pub mod findings;
pub mod fusion;
pub mod pattern_mapper;
pub mod patterns;
pub mod skin;
pub mod trend;

pub use abdominal::*;
pub use classifier::*;
pub use findings::*;
pub use fusion::*;
pub use pattern_mapper::*;
pub use patterns::*;
pub use skin::*;
pub use trend::*;
