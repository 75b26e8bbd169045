//! Deterministic enumeration of a cluster's free parameters.
//!
//! The enumeration defines the layout of the flat optimization vector and
//! must be reproduced exactly for round-trip correctness. Order: (1) keyed
//! rate parameters, one spin at a time, inner loop over condition keys in
//! canonical registration order; (2) per-spin scalar parameters; (3)
//! cluster-scoped parameters, each exactly once, taken from the first
//! selected spin's declared list. Deselected spins contribute no slots; a
//! cluster with zero selected spins yields an empty sequence.

use crate::core::models::cluster::Cluster;
use crate::core::models::dataset::Dataset;
use crate::core::models::params::{ConditionKey, Param, ParamScope};
use crate::core::models::spin::Spin;
use crate::core::registry::{self, ModelInfo};

use super::error::EngineError;

/// One slot of the flat parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamIndex {
    pub param: Param,
    /// Position in the flat vector.
    pub index: usize,
    /// Index of the owning spin within the cluster's selected spins, or
    /// `None` for cluster-shared parameters.
    pub spin: Option<usize>,
    /// Condition key for keyed rate parameters, `None` otherwise.
    pub key: Option<ConditionKey>,
}

/// Validate that every selected spin in the cluster declares the same model
/// and return its registry entry.
pub fn cluster_model(
    dataset: &Dataset,
    cluster: &Cluster,
    cluster_index: usize,
) -> Result<&'static ModelInfo, EngineError> {
    let spins = dataset.selected_spins(cluster);
    let Some((_, first)) = spins.first() else {
        return Err(EngineError::Internal(format!(
            "cluster {cluster_index} has no selected spins"
        )));
    };
    for (_, spin) in &spins {
        if spin.model != first.model {
            return Err(EngineError::ParamSetMismatch {
                cluster: cluster_index,
                spin: spin.name.clone(),
                model: spin.model.clone(),
                expected: first.model.clone(),
            });
        }
    }
    registry::get(&first.model).ok_or_else(|| EngineError::UnknownModel(first.model.clone()))
}

/// Lazily enumerate the flat-vector slots of a cluster, in the canonical
/// order. The returned iterator is finite and non-restartable.
pub fn cluster_params<'a>(
    dataset: &'a Dataset,
    cluster: &'a Cluster,
    model: &'static ModelInfo,
) -> impl Iterator<Item = ParamIndex> + 'a {
    let spins: Vec<&'a Spin> = dataset
        .selected_spins(cluster)
        .into_iter()
        .map(|(_, spin)| spin)
        .collect();
    let any_selected = !spins.is_empty();

    let keyed_rates = spins
        .clone()
        .into_iter()
        .enumerate()
        .flat_map(move |(spin_index, spin)| {
            model
                .params
                .iter()
                .copied()
                .filter(|p| p.descriptor().keyed)
                .flat_map(move |param| {
                    spin.observed_keys()
                        .into_iter()
                        .map(move |key| (param, Some(spin_index), Some(key)))
                })
        });

    let per_spin_scalars = (0..spins.len()).flat_map(move |spin_index| {
        model
            .params
            .iter()
            .copied()
            .filter(|p| {
                let d = p.descriptor();
                d.scope == ParamScope::PerSpin && !d.keyed
            })
            .map(move |param| (param, Some(spin_index), None))
    });

    let cluster_scoped = model
        .params
        .iter()
        .copied()
        .filter(move |p| any_selected && p.descriptor().scope == ParamScope::PerCluster)
        .map(|param| (param, None, None));

    keyed_rates
        .chain(per_spin_scalars)
        .chain(cluster_scoped)
        .enumerate()
        .map(|(index, (param, spin, key))| ParamIndex {
            param,
            index,
            spin,
            key,
        })
}

/// The number of flat-vector slots the cluster occupies.
pub fn slot_count(dataset: &Dataset, cluster: &Cluster, model: &'static ModelInfo) -> usize {
    cluster_params(dataset, cluster, model).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::spin::Measurement;

    fn setup_two_spin_cluster() -> (Dataset, Cluster) {
        let mut dataset = Dataset::new();
        let k600 = dataset.register_condition("600.13");
        let k800 = dataset.register_condition("800.28");

        let mut a = Spin::new("G12N", "CR72");
        let mut b = Spin::new("L45N", "CR72");
        for key in [k600, k800] {
            a.measurements.push(Measurement {
                key,
                x: 66.7,
                y: 20.0,
                error: 0.5,
            });
        }
        // Spin B observed under a single condition.
        b.measurements.push(Measurement {
            key: k600,
            x: 66.7,
            y: 15.0,
            error: 0.5,
        });

        let a = dataset.add_spin(a);
        let b = dataset.add_spin(b);
        (dataset, Cluster::new(vec![a, b]))
    }

    #[test]
    fn enumeration_order_is_rates_then_scalars_then_cluster() {
        let (dataset, cluster) = setup_two_spin_cluster();
        let model = registry::get("CR72").unwrap();
        let layout: Vec<ParamIndex> = cluster_params(&dataset, &cluster, model).collect();

        // CR72: r2 (keyed), pA, dw, kex. Spin A has two keys, spin B one.
        // Expected: r2(A,600) r2(A,800) r2(B,600) dw(A) dw(B) pA kex.
        let expected = [
            (Param::R2, Some(0), Some(ConditionKey(0))),
            (Param::R2, Some(0), Some(ConditionKey(1))),
            (Param::R2, Some(1), Some(ConditionKey(0))),
            (Param::Dw, Some(0), None),
            (Param::Dw, Some(1), None),
            (Param::PA, None, None),
            (Param::Kex, None, None),
        ];
        assert_eq!(layout.len(), expected.len());
        for (slot, (param, spin, key)) in layout.iter().zip(expected) {
            assert_eq!((slot.param, slot.spin, slot.key), (param, spin, key));
            assert_eq!(slot.index, layout.iter().position(|s| s == slot).unwrap());
        }
    }

    #[test]
    fn deselected_spins_contribute_no_slots() {
        let (mut dataset, cluster) = setup_two_spin_cluster();
        let second = cluster.spins[1];
        dataset.spins[second].selected = false;

        let model = registry::get("CR72").unwrap();
        // r2(A,600) r2(A,800) dw(A) pA kex.
        assert_eq!(slot_count(&dataset, &cluster, model), 5);
    }

    #[test]
    fn zero_selected_spins_yield_empty_sequence() {
        let (mut dataset, cluster) = setup_two_spin_cluster();
        for &id in &cluster.spins {
            dataset.spins[id].selected = false;
        }
        let model = registry::get("CR72").unwrap();
        assert_eq!(slot_count(&dataset, &cluster, model), 0);
    }

    #[test]
    fn mismatched_models_within_cluster_are_fatal() {
        let (mut dataset, cluster) = setup_two_spin_cluster();
        let second = cluster.spins[1];
        dataset.spins[second].model = "LM63".to_string();

        let err = cluster_model(&dataset, &cluster, 0).unwrap_err();
        assert!(matches!(err, EngineError::ParamSetMismatch { .. }));
    }
}
