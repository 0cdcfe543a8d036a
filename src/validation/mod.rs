//! Pre-flight checks run before any model is trained.
//!
//! - Temporal bounds: the requested train/test windows must lie within the
//!   labeled data.
//! - Quality: no feature column may be missing more than a threshold share
//!   of its values.

pub mod quality;
pub mod temporal;

pub use quality::{ColumnMissing, QualityGate, QualityReport, DEFAULT_MISSING_THRESHOLD};
pub use temporal::{TemporalBoundaryValidator, TemporalWindow, ValidationWindow};
