//! # dispfit Core Library
//!
//! A clustered nonlinear model-fitting engine for relaxation-dispersion
//! measurements of biomolecular spin systems.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a clear
//! separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless data models (`Dataset`, `Spin`,
//!   `Cluster`), the static model registry describing every supported dispersion
//!   model, and dataset I/O utilities.
//!
//! - **[`engine`]: The Logic Core.** This stateful layer orchestrates the optimization
//!   process. It includes the parameter indexer that maps named physical parameters
//!   onto flat optimization vectors, the linear constraint builder, the discretized
//!   grid search, the simplex minimizer, the master/worker dispatch queue, and the
//!   Monte Carlo error loop.
//!
//! - **[`workflows`]: The Public API.** This is the highest-level, user-facing layer.
//!   It ties the `engine` and `core` together to execute a complete clustered fit of
//!   one dispersion model, from nesting resolution through error estimation.

pub mod core;
pub mod engine;
pub mod workflows;
