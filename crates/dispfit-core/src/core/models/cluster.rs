//! Clusters: ordered groups of spins fit jointly with shared parameters.

use super::ids::SpinId;

/// An ordered, non-empty set of spins that share cluster-level parameters
/// (e.g. a common exchange rate).
///
/// Invariant: every selected spin in a cluster must declare the identical
/// model (and hence parameter set); this is validated before fitting.
#[derive(Debug, Clone, Default)]
pub struct Cluster {
    pub spins: Vec<SpinId>,
}

impl Cluster {
    pub fn new(spins: Vec<SpinId>) -> Self {
        Self { spins }
    }
}
