//! Data models for the fitting engine.
//!
//! A [`dataset::Dataset`] owns every [`spin::Spin`] in a `SlotMap` and groups
//! them into [`cluster::Cluster`]s that are fit jointly. Parameter naming and
//! slot accounting are defined by [`params`].

pub mod cluster;
pub mod dataset;
pub mod ids;
pub mod params;
pub mod spin;
