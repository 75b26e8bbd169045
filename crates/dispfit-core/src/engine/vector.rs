//! Conversion between named per-spin parameters and flat optimization
//! vectors, plus the diagonal scaling used to condition the search.

use nalgebra::DVector;
use tracing::warn;

use crate::core::models::cluster::Cluster;
use crate::core::models::dataset::Dataset;
use crate::core::models::ids::SpinId;
use crate::core::models::params::ParamCategory;
use crate::core::registry::{Derivation, ModelInfo};

use super::indexer::ParamIndex;

/// Numeric scale of one parameter category. The scaled coordinate seen by
/// the minimizer is `physical / scale`.
pub const fn scale_factor(category: ParamCategory) -> f64 {
    match category {
        ParamCategory::Rate => 10.0,
        ParamCategory::ShiftDifference => 1.0,
        ParamCategory::Population => 1.0,
        ParamCategory::ExchangeRate => 1.0e4,
        ParamCategory::TimeConstant => 1.0e-4,
        ParamCategory::ExchangeContribution => 10.0,
    }
}

/// The diagonal of the scaling matrix, one entry per flat-vector slot.
pub fn scaling_matrix(layout: &[ParamIndex]) -> DVector<f64> {
    DVector::from_iterator(
        layout.len(),
        layout
            .iter()
            .map(|slot| scale_factor(slot.param.descriptor().category)),
    )
}

pub fn scale(physical: &DVector<f64>, scaling: &DVector<f64>) -> DVector<f64> {
    physical.component_div(scaling)
}

pub fn unscale(scaled: &DVector<f64>, scaling: &DVector<f64>) -> DVector<f64> {
    scaled.component_mul(scaling)
}

/// Assemble the flat parameter vector of a cluster. Missing values are
/// replaced with 0.0. Cluster-scoped slots read from the first selected
/// spin.
pub fn assemble(dataset: &Dataset, cluster: &Cluster, layout: &[ParamIndex]) -> DVector<f64> {
    let spins = dataset.selected_spins(cluster);
    DVector::from_iterator(
        layout.len(),
        layout.iter().map(|slot| {
            spins
                .get(slot.spin.unwrap_or(0))
                .and_then(|(_, spin)| spin.value(slot.param, slot.key))
                .unwrap_or(0.0)
        }),
    )
}

/// Assemble from the simulated series at a repetition index instead of the
/// point estimates.
pub fn assemble_sim(
    dataset: &Dataset,
    cluster: &Cluster,
    layout: &[ParamIndex],
    repetition: usize,
) -> DVector<f64> {
    let spins = dataset.selected_spins(cluster);
    DVector::from_iterator(
        layout.len(),
        layout.iter().map(|slot| {
            spins
                .get(slot.spin.unwrap_or(0))
                .and_then(|(_, spin)| spin.sim_value(slot.param, slot.key, repetition))
                .unwrap_or(0.0)
        }),
    )
}

/// Write a flat vector (already unscaled) back onto the cluster's spins,
/// then re-derive dependent parameters in the model's declared order.
///
/// Cluster-scoped slots are written to every selected spin so any spin of
/// the cluster can be read standalone afterwards.
pub fn disassemble(
    dataset: &mut Dataset,
    cluster: &Cluster,
    model: &ModelInfo,
    layout: &[ParamIndex],
    vector: &DVector<f64>,
) {
    let ids: Vec<SpinId> = dataset
        .selected_spins(cluster)
        .into_iter()
        .map(|(id, _)| id)
        .collect();

    for slot in layout {
        let value = vector[slot.index];
        match slot.spin {
            Some(spin_index) => {
                if let Some(&id) = ids.get(spin_index) {
                    dataset.spins[id].set_value(slot.param, slot.key, value);
                }
            }
            None => {
                for &id in &ids {
                    dataset.spins[id].set_value(slot.param, slot.key, value);
                }
            }
        }
    }

    derive(dataset, &ids, model);
}

/// Apply the model's derivation rules to every spin, in declaration order,
/// so dependent parameters stay consistent with the fitted ones.
fn derive(dataset: &mut Dataset, ids: &[SpinId], model: &ModelInfo) {
    for &id in ids {
        let spin = &mut dataset.spins[id];
        for rule in model.derivations {
            match *rule {
                Derivation::Complement { from, to } => {
                    if let Some(v) = spin.value(from, None) {
                        spin.set_value(to, None, 1.0 - v);
                    }
                }
                Derivation::ComplementPair { a, b, to } => {
                    if let (Some(va), Some(vb)) = (spin.value(a, None), spin.value(b, None)) {
                        spin.set_value(to, None, 1.0 - va - vb);
                    }
                }
                Derivation::Reciprocal { from, to } => match spin.value(from, None) {
                    Some(v) if v != 0.0 => spin.set_value(to, None, 1.0 / v),
                    Some(_) => {
                        warn!(spin = %spin.name, param = %from, "Skipping reciprocal derivation of zero value.");
                    }
                    None => {}
                },
                Derivation::FluxForward { rate, pop, to } => {
                    if let (Some(k), Some(p)) = (spin.value(rate, None), spin.value(pop, None)) {
                        spin.set_value(to, None, (1.0 - p) * k);
                    }
                }
                Derivation::FluxReverse { rate, pop, to } => {
                    if let (Some(k), Some(p)) = (spin.value(rate, None), spin.value(pop, None)) {
                        spin.set_value(to, None, p * k);
                    }
                }
            }
        }
    }
}

/// Write per-slot standard deviations into the spins' error maps.
pub fn write_errors(
    dataset: &mut Dataset,
    cluster: &Cluster,
    layout: &[ParamIndex],
    errors: &DVector<f64>,
) {
    let ids: Vec<SpinId> = dataset
        .selected_spins(cluster)
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    for slot in layout {
        let value = errors[slot.index];
        match slot.spin {
            Some(spin_index) => {
                if let Some(&id) = ids.get(spin_index) {
                    dataset.spins[id].set_error(slot.param, slot.key, value);
                }
            }
            None => {
                for &id in &ids {
                    dataset.spins[id].set_error(slot.param, slot.key, value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::params::{ConditionKey, Param};
    use crate::core::models::spin::{Measurement, Spin};
    use crate::core::registry;
    use crate::engine::indexer;

    fn setup_cluster() -> (Dataset, Cluster) {
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
            b.measurements.push(Measurement {
                key,
                x: 66.7,
                y: 15.0,
                error: 0.5,
            });
        }
        let a = dataset.add_spin(a);
        let b = dataset.add_spin(b);
        (dataset, Cluster::new(vec![a, b]))
    }

    #[test]
    fn assemble_length_matches_indexer_slot_count() {
        let (dataset, cluster) = setup_cluster();
        let model = registry::get("CR72").unwrap();
        let layout: Vec<_> = indexer::cluster_params(&dataset, &cluster, model).collect();
        let vector = assemble(&dataset, &cluster, &layout);
        // 2 spins x 2 keys for r2, 2 dw, pA, kex.
        assert_eq!(vector.len(), 8);
        assert_eq!(vector.len(), indexer::slot_count(&dataset, &cluster, model));
    }

    #[test]
    fn round_trip_is_exact_on_stored_parameters() {
        let (mut dataset, cluster) = setup_cluster();
        let model = registry::get("CR72").unwrap();
        let layout: Vec<_> = indexer::cluster_params(&dataset, &cluster, model).collect();

        let values: Vec<f64> = (0..layout.len()).map(|i| 1.5 + i as f64).collect();
        let vector = DVector::from_vec(values);
        disassemble(&mut dataset, &cluster, model, &layout, &vector);
        let back = assemble(&dataset, &cluster, &layout);
        assert_eq!(back, vector);
    }

    #[test]
    fn derivations_follow_disassembly() {
        let (mut dataset, cluster) = setup_cluster();
        let model = registry::get("CR72").unwrap();
        let layout: Vec<_> = indexer::cluster_params(&dataset, &cluster, model).collect();

        let mut vector = assemble(&dataset, &cluster, &layout);
        for slot in &layout {
            vector[slot.index] = match slot.param {
                Param::PA => 0.9,
                Param::Kex => 1000.0,
                _ => 10.0,
            };
        }
        disassemble(&mut dataset, &cluster, model, &layout, &vector);

        let spin = &dataset.spins[cluster.spins[0]];
        assert!((spin.value(Param::PB, None).unwrap() - 0.1).abs() < 1e-12);
        assert!((spin.value(Param::Tex, None).unwrap() - 1e-3).abs() < 1e-15);
        assert!((spin.value(Param::KAB, None).unwrap() - 100.0).abs() < 1e-9);
        assert!((spin.value(Param::KBA, None).unwrap() - 900.0).abs() < 1e-9);
    }

    #[test]
    fn missing_values_assemble_as_zero() {
        let (dataset, cluster) = setup_cluster();
        let model = registry::get("CR72").unwrap();
        let layout: Vec<_> = indexer::cluster_params(&dataset, &cluster, model).collect();
        let vector = assemble(&dataset, &cluster, &layout);
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn scaling_divides_physical_coordinates() {
        let (dataset, cluster) = setup_cluster();
        let model = registry::get("CR72").unwrap();
        let layout: Vec<_> = indexer::cluster_params(&dataset, &cluster, model).collect();
        let scaling = scaling_matrix(&layout);

        let kex_slot = layout.iter().find(|s| s.param == Param::Kex).unwrap();
        assert_eq!(scaling[kex_slot.index], 1.0e4);

        let mut physical = DVector::zeros(layout.len());
        physical[kex_slot.index] = 2.0e4;
        let scaled = scale(&physical, &scaling);
        assert_eq!(scaled[kex_slot.index], 2.0);
        assert_eq!(unscale(&scaled, &scaling), physical);
    }

    #[test]
    fn sim_assembly_reads_the_requested_repetition() {
        let (mut dataset, cluster) = setup_cluster();
        let model = registry::get("CR72").unwrap();
        let layout: Vec<_> = indexer::cluster_params(&dataset, &cluster, model).collect();

        let ids: Vec<_> = cluster.spins.clone();
        for &id in &ids {
            dataset.spins[id].push_sim_value(Param::Kex, None, 900.0);
            dataset.spins[id].push_sim_value(Param::Kex, None, 1100.0);
        }
        let kex_slot = layout.iter().find(|s| s.param == Param::Kex).unwrap();
        let v0 = assemble_sim(&dataset, &cluster, &layout, 0);
        let v1 = assemble_sim(&dataset, &cluster, &layout, 1);
        assert_eq!(v0[kex_slot.index], 900.0);
        assert_eq!(v1[kex_slot.index], 1100.0);
    }
}
