//! # Palpa-Signal
//!
//! Signal path for wrist pulse recordings, from vendor frames to named
//! feature sets.
//!
//! ## Pipeline Stages
//!
//! 1. **Adapter**: decode device frames, convert units, apply calibration
//! 2. **Preprocess**: order packets, remove baseline, zero-phase band-pass,
//!    resample to the canonical rate, estimate quality
//! 3. **Features**: beat timing and morphology (time domain), band energies
//!    (frequency domain), sub-band energies (wavelet domain)
//!
//! Every stage is deterministic so identical packets always yield identical
//! feature values.

pub mod adapter;
pub mod extractor;
pub mod features;
pub mod filtering;
pub mod packet;
pub mod preprocess;
pub mod spectrum;
pub mod synthetic;
pub mod wavelet;

pub use adapter::*;
pub use extractor::*;
pub use features::*;
pub use filtering::*;
pub use packet::*;
pub use preprocess::*;
pub use spectrum::*;
pub use synthetic::*;
pub use wavelet::*;
