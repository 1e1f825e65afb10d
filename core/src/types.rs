//! Shared primitive types used across the engine.

/// Stable customer key, as found in the roster.
pub type CustomerId = String;

/// The canonical scoring-run identifier.
pub type RunId = String;

/// Version number of a persisted churn model artifact.
pub type ModelVersion = u32;
