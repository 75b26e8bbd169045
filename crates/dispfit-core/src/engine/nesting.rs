//! Seeding a model's starting point from a previously fit, simpler model.
//!
//! When the previous fit used a model the target declares a nesting edge to,
//! the fitted values are translated onto the target's parameters spin by
//! spin. A source with the identical free-parameter set makes the two models
//! equivalent: everything is copied and the grid search is skipped outright.
//! Otherwise the seeded parameters are fixed and the grid runs over the
//! remainder only.

use tracing::debug;

use crate::core::models::cluster::Cluster;
use crate::core::models::dataset::Dataset;
use crate::core::models::ids::SpinId;
use crate::core::models::params::Param;
use crate::core::models::spin::Spin;
use crate::core::registry::{ModelInfo, Translation};

use super::error::EngineError;

/// How the target model relates to the source fit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NestingOutcome {
    /// No declared edge; the grid covers every free parameter.
    NoRelation,
    /// Identical parameter sets; all values copied, no grid needed.
    Equivalent,
    /// A proper nesting edge; `seeded` parameters are fixed at their
    /// translated values and excluded from the grid.
    Nested { seeded: Vec<Param> },
}

impl NestingOutcome {
    /// Whether a grid search over the remaining parameters is still
    /// required. Only an equivalent source removes it.
    pub fn grid_required(&self) -> bool {
        !matches!(self, NestingOutcome::Equivalent)
    }

    pub fn is_seeded(&self, param: Param) -> bool {
        match self {
            NestingOutcome::NoRelation => false,
            NestingOutcome::Equivalent => true,
            NestingOutcome::Nested { seeded } => seeded.contains(&param),
        }
    }
}

fn scalar(spin: &Spin, param: Param) -> Result<f64, EngineError> {
    spin.value(param, None).ok_or_else(|| EngineError::MissingValue {
        spin: spin.name.clone(),
        param,
    })
}

/// Copy `from` onto `to` on one spin, honoring keyed parameters.
fn copy_direct(spin: &mut Spin, from: Param, to: Param) -> Result<(), EngineError> {
    if from.descriptor().keyed && to.descriptor().keyed {
        for key in spin.observed_keys() {
            let value = spin
                .value(from, Some(key))
                .ok_or_else(|| EngineError::MissingValue {
                    spin: spin.name.clone(),
                    param: from,
                })?;
            spin.set_value(to, Some(key), value);
        }
    } else {
        let value = scalar(spin, from)?;
        spin.set_value(to, None, value);
    }
    Ok(())
}

fn apply_translations(
    spin: &mut Spin,
    translations: &[Translation],
    source_id: &str,
) -> Result<(), EngineError> {
    for translation in translations {
        match *translation {
            Translation::Direct { from, to } => copy_direct(spin, from, to)?,
            Translation::Reciprocal { from, to } => {
                let value = scalar(spin, from)?;
                if value == 0.0 {
                    return Err(EngineError::NestingZeroDivision {
                        param: from,
                        source_model: source_id.to_string(),
                    });
                }
                spin.set_value(to, None, 1.0 / value);
            }
            Translation::Composite { rate, pop, to } => {
                let k = scalar(spin, rate)?;
                let p = scalar(spin, pop)?;
                spin.set_value(to, None, (1.0 - p) * k);
            }
        }
    }
    Ok(())
}

/// Seed `target`'s starting values on every selected spin of the cluster
/// from a fit of `source`, following the target's declared nesting edges.
pub fn resolve(
    dataset: &mut Dataset,
    cluster: &Cluster,
    target: &'static ModelInfo,
    source: &ModelInfo,
) -> Result<NestingOutcome, EngineError> {
    let ids: Vec<SpinId> = dataset
        .selected_spins(cluster)
        .into_iter()
        .map(|(id, _)| id)
        .collect();

    if target.same_param_set(source) {
        for &id in &ids {
            let spin = &mut dataset.spins[id];
            for &param in target.params {
                copy_direct(spin, param, param)?;
            }
        }
        debug!(target = target.id, source = source.id, "Equivalent parameter sets, grid skipped.");
        return Ok(NestingOutcome::Equivalent);
    }

    let Some(edge) = target.nests_from.iter().find(|e| e.source == source.id) else {
        return Ok(NestingOutcome::NoRelation);
    };

    for &id in &ids {
        apply_translations(&mut dataset.spins[id], edge.translations, source.id)?;
    }

    let mut seeded = Vec::new();
    for translation in edge.translations {
        let to = match *translation {
            Translation::Direct { to, .. } => to,
            Translation::Reciprocal { to, .. } => to,
            Translation::Composite { to, .. } => to,
        };
        if !seeded.contains(&to) {
            seeded.push(to);
        }
    }
    debug!(
        target = target.id,
        source = source.id,
        seeded = seeded.len(),
        "Nested start translated, grid restricted to unseeded parameters."
    );
    Ok(NestingOutcome::Nested { seeded })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::spin::Measurement;
    use crate::core::registry;

    fn setup_fitted_cr72() -> (Dataset, Cluster) {
        let mut dataset = Dataset::new();
        let k600 = dataset.register_condition("600.13");
        let k800 = dataset.register_condition("800.28");

        let mut spin = Spin::new("G12N", "CR72");
        for key in [k600, k800] {
            spin.measurements.push(Measurement {
                key,
                x: 66.7,
                y: 20.0,
                error: 0.5,
            });
        }
        spin.set_value(Param::R2, Some(k600), 12.0);
        spin.set_value(Param::R2, Some(k800), 14.0);
        spin.set_value(Param::PA, None, 0.9);
        spin.set_value(Param::Dw, None, 2.5);
        spin.set_value(Param::Kex, None, 1000.0);
        let id = dataset.add_spin(spin);
        (dataset, Cluster::new(vec![id]))
    }

    #[test]
    fn equivalent_param_sets_copy_everything_and_skip_the_grid() {
        let (mut dataset, cluster) = setup_fitted_cr72();
        let target = registry::get("B14").unwrap();
        let source = registry::get("CR72").unwrap();

        let outcome = resolve(&mut dataset, &cluster, target, source).unwrap();
        assert_eq!(outcome, NestingOutcome::Equivalent);
        assert!(!outcome.grid_required());
        assert!(outcome.is_seeded(Param::Kex));
    }

    #[test]
    fn nested_edge_translates_but_still_requires_a_grid() {
        let (mut dataset, cluster) = setup_fitted_cr72();
        let target = registry::get("MMQ CR72").unwrap();
        let source = registry::get("CR72").unwrap();

        let outcome = resolve(&mut dataset, &cluster, target, source).unwrap();
        let NestingOutcome::Nested { seeded } = &outcome else {
            panic!("expected a nested outcome, got {outcome:?}");
        };
        assert!(outcome.grid_required());
        assert_eq!(seeded, &vec![Param::R2, Param::PA, Param::Dw, Param::Kex]);
        // dwH has no source and stays unseeded.
        assert!(!outcome.is_seeded(Param::DwH));
    }

    #[test]
    fn split_copy_feeds_both_component_rates() {
        let (mut dataset, cluster) = setup_fitted_cr72();
        let target = registry::get("CR72 full").unwrap();
        let source = registry::get("CR72").unwrap();
        let k600 = crate::core::models::params::ConditionKey(0);

        resolve(&mut dataset, &cluster, target, source).unwrap();
        let spin = &dataset.spins[cluster.spins[0]];
        assert_eq!(spin.value(Param::R2A, Some(k600)), Some(12.0));
        assert_eq!(spin.value(Param::R2B, Some(k600)), Some(12.0));
    }

    #[test]
    fn reciprocal_translation_inverts_the_exchange_rate() {
        let (mut dataset, cluster) = setup_fitted_cr72();
        let target = registry::get("IT99").unwrap();
        let source = registry::get("CR72").unwrap();

        resolve(&mut dataset, &cluster, target, source).unwrap();
        let spin = &dataset.spins[cluster.spins[0]];
        assert!((spin.value(Param::Tex, None).unwrap() - 1e-3).abs() < 1e-15);
    }

    #[test]
    fn reciprocal_of_zero_is_a_hard_error() {
        let (mut dataset, cluster) = setup_fitted_cr72();
        dataset.spins[cluster.spins[0]].set_value(Param::Kex, None, 0.0);

        let target = registry::get("IT99").unwrap();
        let source = registry::get("CR72").unwrap();
        let err = resolve(&mut dataset, &cluster, target, source).unwrap_err();
        assert!(matches!(
            err,
            EngineError::NestingZeroDivision { param: Param::Kex, .. }
        ));
    }

    #[test]
    fn composite_translation_builds_the_forward_rate() {
        let (mut dataset, cluster) = setup_fitted_cr72();
        let target = registry::get("TSMFK01").unwrap();
        let source = registry::get("CR72").unwrap();

        resolve(&mut dataset, &cluster, target, source).unwrap();
        let spin = &dataset.spins[cluster.spins[0]];
        // k_AB = (1 - pA) * kex = 0.1 * 1000.
        assert!((spin.value(Param::KAB, None).unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn unrelated_source_leaves_the_cluster_untouched() {
        let (mut dataset, cluster) = setup_fitted_cr72();
        let target = registry::get("TP02").unwrap();
        let source = registry::get("CR72").unwrap();

        let outcome = resolve(&mut dataset, &cluster, target, source).unwrap();
        assert_eq!(outcome, NestingOutcome::NoRelation);
        assert!(!outcome.is_seeded(Param::Kex));
    }

    #[test]
    fn missing_source_value_is_reported_by_name() {
        let (mut dataset, cluster) = setup_fitted_cr72();
        let mut bare = Spin::new("L45N", "CR72");
        bare.measurements.push(Measurement {
            key: crate::core::models::params::ConditionKey(0),
            x: 66.7,
            y: 15.0,
            error: 0.5,
        });
        let id = dataset.add_spin(bare);
        let cluster = Cluster::new(vec![cluster.spins[0], id]);

        let target = registry::get("TSMFK01").unwrap();
        let source = registry::get("CR72").unwrap();
        let err = resolve(&mut dataset, &cluster, target, source).unwrap_err();
        assert!(matches!(
            err,
            EngineError::MissingValue { ref spin, .. } if spin == "L45N"
        ));
    }
}
