//! Stateless foundations: data models for spins, clusters and datasets, the
//! static dispersion-model registry, and dataset I/O utilities.

pub mod io;
pub mod models;
pub mod registry;
