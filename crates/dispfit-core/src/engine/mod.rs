//! # Engine Module
//!
//! The stateful optimization layer of dispfit. It turns the named parameters
//! of a cluster of spins into a flat numeric vector, generates the linear
//! constraints that keep the search physically meaningful, runs the
//! discretized grid search and the simplex refinement through a fork-join
//! work queue, and quantifies parameter uncertainty by Monte Carlo
//! resampling.
//!
//! Submodules:
//!
//! - **Configuration** ([`config`]) - Fit settings, algorithm validation, builders
//! - **Error Handling** ([`error`]) - Engine-specific error taxonomy
//! - **Progress Monitoring** ([`progress`]) - Progress reporting callbacks
//! - **Indexing** ([`indexer`]) - Deterministic parameter enumeration for clusters
//! - **Vectors** ([`vector`]) - Assembly/disassembly between named and flat form
//! - **Constraints** ([`constraints`]) - Linear inequality constraint generation
//! - **Grid Search** ([`grid`]) - Discretized search with pruning and sharding
//! - **Minimization** ([`minimize`]) - Nelder-Mead simplex refinement
//! - **Objective** ([`objective`]) - Chi-squared adapter over the physics seam
//! - **Nesting** ([`nesting`]) - Parameter seeding between related models
//! - **Dispatch** ([`dispatch`]) - Master/worker queue and result merging
//! - **Monte Carlo** ([`monte_carlo`]) - Resampling loop for error estimation

pub mod config;
pub mod constraints;
pub(crate) mod context;
pub mod dispatch;
pub mod error;
pub mod grid;
pub mod indexer;
pub mod minimize;
pub mod monte_carlo;
pub mod nesting;
pub mod objective;
pub mod progress;
pub mod vector;
