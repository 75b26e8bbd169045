//! # Workflows Module
//!
//! The highest-level, user-facing layer: complete fit pipelines built from
//! the engine's components. A workflow owns the phase sequencing and all
//! dataset write-back; the engine below it stays side-effect free.

pub mod fit;

pub use fit::{run_fit, ClusterFit, FitReport, MonteCarloSummary};
