//! Monte Carlo error estimation.
//!
//! Synthetic datasets are drawn around the back-calculated best-fit curves
//! using each measurement's own uncertainty, then refit by simplex from the
//! best point. Each repetition seeds its own generator from the base seed
//! plus the repetition index, so results are reproducible regardless of the
//! worker pool's scheduling. Refits landing in unphysical territory are
//! eliminated before the spread is computed.

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, instrument, warn};

use crate::core::models::cluster::Cluster;
use crate::core::models::dataset::Dataset;
use crate::core::models::ids::SpinId;
use crate::core::models::params::{Param, ParamCategory};
use crate::core::registry::{ModelInfo, PopulationPolicy};

use super::config::MonteCarloSettings;
use super::constraints::{PointFilter, PA_LOWER, PA_LOWER_SKEWED, RATE_CAP_FALLBACK};
use super::dispatch::{self, JobKind, WorkItem};
use super::error::EngineError;
use super::indexer::ParamIndex;
use super::minimize::SimplexSettings;
use super::objective::{Chi2Objective, ClusterSnapshot, DispersionModel};
use super::vector;

/// Upper limit on a refit exchange time constant, in seconds.
const TEX_LIMIT: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct MonteCarloOutcome {
    pub requested: usize,
    pub kept: usize,
    pub eliminated: usize,
    /// Per-slot standard deviation over the kept repetitions.
    pub errors: DVector<f64>,
}

/// Reason a refit vector is excluded from the error estimate, if any.
fn eliminated_reason(
    layout: &[ParamIndex],
    model: &ModelInfo,
    physical: &DVector<f64>,
) -> Option<&'static str> {
    let pa_lower = match model.population_policy {
        PopulationPolicy::Free => PA_LOWER,
        PopulationPolicy::Skewed => PA_LOWER_SKEWED,
    };
    for slot in layout {
        let value = physical[slot.index];
        match slot.param.descriptor().category {
            ParamCategory::ExchangeRate if value > RATE_CAP_FALLBACK => {
                return Some("exchange rate above the physical cap");
            }
            ParamCategory::TimeConstant if value > TEX_LIMIT => {
                return Some("exchange time constant above one second");
            }
            ParamCategory::Population if slot.param == Param::PA => {
                if value < pa_lower || value >= 1.0 {
                    return Some("dominant population outside its bounds");
                }
            }
            _ => {}
        }
    }
    None
}

fn synthetic_observations(
    snapshot: &ClusterSnapshot,
    curves: &[Vec<f64>],
    rng: &mut StdRng,
) -> Result<Vec<Vec<f64>>, EngineError> {
    snapshot
        .spins
        .iter()
        .zip(curves)
        .map(|(spin, curve)| {
            spin.measurements
                .iter()
                .zip(curve)
                .map(|(m, &center)| {
                    let normal = Normal::new(center, m.error).map_err(|e| {
                        EngineError::Internal(format!(
                            "invalid sampling distribution for spin '{}': {e}",
                            spin.name
                        ))
                    })?;
                    Ok(normal.sample(rng))
                })
                .collect()
        })
        .collect()
}

/// Run the Monte Carlo loop for one cluster from its refined best point,
/// write the kept repetitions into the spins' simulated series and the
/// per-parameter standard deviations into their error maps.
#[allow(clippy::too_many_arguments)]
#[instrument(skip_all, name = "monte_carlo", fields(simulations = settings.simulations))]
pub fn run<M: DispersionModel + ?Sized>(
    dataset: &mut Dataset,
    cluster: &Cluster,
    model: &'static ModelInfo,
    layout: &[ParamIndex],
    snapshot: &ClusterSnapshot,
    physics: &M,
    best: &DVector<f64>,
    settings: &MonteCarloSettings,
    simplex: &SimplexSettings,
    scaling: Option<&DVector<f64>>,
    filter: Option<&PointFilter>,
) -> Result<MonteCarloOutcome, EngineError> {
    let curves = Chi2Objective::new(snapshot, physics).back_calc_all(best);

    let mut items = Vec::with_capacity(settings.simulations);
    for rep in 0..settings.simulations {
        let mut rng = StdRng::seed_from_u64(settings.seed.wrapping_add(rep as u64));
        let observations = synthetic_observations(snapshot, &curves, &mut rng)?;
        items.push(WorkItem {
            cluster_index: rep,
            snapshot: snapshot.with_observations(&observations),
            kind: JobKind::Refine { start: best.clone() },
            scaling: scaling.cloned(),
            filter: filter.cloned(),
            simplex: *simplex,
        });
    }
    let outcomes = dispatch::run_queue(items, physics, None)?;

    let mut kept: Vec<DVector<f64>> = Vec::with_capacity(outcomes.len());
    let mut eliminated = 0usize;
    for outcome in outcomes {
        match eliminated_reason(layout, model, &outcome.best) {
            Some(reason) => {
                eliminated += 1;
                debug!(repetition = outcome.cluster_index, reason, "Eliminating refit.");
            }
            None => kept.push(outcome.best),
        }
    }

    let ids: Vec<SpinId> = dataset
        .selected_spins(cluster)
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    for &id in &ids {
        dataset.spins[id].clear_sim();
    }

    let n = layout.len();
    if kept.is_empty() {
        warn!("Every Monte Carlo repetition was eliminated; no errors estimated.");
        return Ok(MonteCarloOutcome {
            requested: settings.simulations,
            kept: 0,
            eliminated,
            errors: DVector::zeros(n),
        });
    }

    for point in &kept {
        for slot in layout {
            let value = point[slot.index];
            match slot.spin {
                Some(spin_index) => {
                    if let Some(&id) = ids.get(spin_index) {
                        dataset.spins[id].push_sim_value(slot.param, slot.key, value);
                    }
                }
                None => {
                    for &id in &ids {
                        dataset.spins[id].push_sim_value(slot.param, slot.key, value);
                    }
                }
            }
        }
    }

    let count = kept.len() as f64;
    let mut errors = DVector::zeros(n);
    for i in 0..n {
        let mean: f64 = kept.iter().map(|p| p[i]).sum::<f64>() / count;
        let variance: f64 = kept.iter().map(|p| (p[i] - mean) * (p[i] - mean)).sum::<f64>() / count;
        errors[i] = variance.sqrt();
    }
    vector::write_errors(dataset, cluster, layout, &errors);

    debug!(kept = kept.len(), eliminated, "Monte Carlo finished.");
    Ok(MonteCarloOutcome {
        requested: settings.simulations,
        kept: kept.len(),
        eliminated,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::params::ConditionKey;
    use crate::core::models::spin::{Measurement, Spin};
    use crate::core::registry;
    use crate::engine::objective::test_support::LineModel;

    fn line_layout() -> Vec<ParamIndex> {
        vec![
            ParamIndex {
                param: Param::R2,
                index: 0,
                spin: Some(0),
                key: Some(ConditionKey(0)),
            },
            ParamIndex {
                param: Param::Kex,
                index: 1,
                spin: None,
                key: None,
            },
        ]
    }

    fn setup_line(n: usize) -> (Dataset, Cluster) {
        let mut dataset = Dataset::new();
        let key = dataset.register_condition("600.13");
        let mut spin = Spin::new("S1", "CR72");
        for i in 0..n {
            let x = i as f64;
            spin.measurements.push(Measurement {
                key,
                x,
                y: 3.0 + 2.0 * x,
                error: 0.5,
            });
        }
        let id = dataset.add_spin(spin);
        (dataset, Cluster::new(vec![id]))
    }

    fn simplex() -> SimplexSettings {
        SimplexSettings {
            max_iterations: 1000,
            tolerance: 1e-10,
        }
    }

    fn physics() -> LineModel {
        LineModel {
            slope_param: Param::Kex,
            intercept_param: Param::R2,
        }
    }

    #[test]
    fn recovered_spread_matches_the_analytic_uncertainty() {
        // Straight line through 5 points at x = 0..4 with sigma = 0.5:
        // var(intercept) = sigma^2 (1/n + xbar^2/Sxx) = 0.15,
        // var(slope) = sigma^2 / Sxx = 0.025.
        let (mut dataset, cluster) = setup_line(5);
        let layout = line_layout();
        let snapshot = ClusterSnapshot::capture(&dataset, &cluster, layout.clone());
        let model = registry::get("CR72").unwrap();
        let settings = MonteCarloSettings {
            simulations: 2000,
            seed: 42,
        };

        let outcome = run(
            &mut dataset,
            &cluster,
            model,
            &layout,
            &snapshot,
            &physics(),
            &DVector::from_vec(vec![3.0, 2.0]),
            &settings,
            &simplex(),
            None,
            None,
        )
        .unwrap();

        assert_eq!(outcome.kept + outcome.eliminated, 2000);
        let sd_intercept = 0.15f64.sqrt();
        let sd_slope = 0.025f64.sqrt();
        assert!((outcome.errors[0] - sd_intercept).abs() / sd_intercept < 0.1);
        assert!((outcome.errors[1] - sd_slope).abs() / sd_slope < 0.1);

        // Spreads land in the spins' error maps and the kept repetitions in
        // their simulated series.
        let spin = &dataset.spins[cluster.spins[0]];
        assert_eq!(spin.error(Param::Kex, None), Some(outcome.errors[1]));
        assert_eq!(
            spin.error(Param::R2, Some(ConditionKey(0))),
            Some(outcome.errors[0])
        );
        let first = crate::engine::vector::assemble_sim(&dataset, &cluster, &layout, 0);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn identical_seeds_reproduce_identical_errors() {
        let settings = MonteCarloSettings {
            simulations: 200,
            seed: 7,
        };
        let model = registry::get("CR72").unwrap();
        let layout = line_layout();

        let mut runs = Vec::new();
        for _ in 0..2 {
            let (mut dataset, cluster) = setup_line(5);
            let snapshot = ClusterSnapshot::capture(&dataset, &cluster, layout.clone());
            let outcome = run(
                &mut dataset,
                &cluster,
                model,
                &layout,
                &snapshot,
                &physics(),
                &DVector::from_vec(vec![3.0, 2.0]),
                &settings,
                &simplex(),
                None,
                None,
            )
            .unwrap();
            runs.push(outcome.errors);
        }
        assert_eq!(runs[0], runs[1]);
    }

    #[test]
    fn elimination_rules_flag_unphysical_refits() {
        let model = registry::get("CR72").unwrap();
        let layout = vec![
            ParamIndex {
                param: Param::PA,
                index: 0,
                spin: None,
                key: None,
            },
            ParamIndex {
                param: Param::Kex,
                index: 1,
                spin: None,
                key: None,
            },
            ParamIndex {
                param: Param::Tex,
                index: 2,
                spin: None,
                key: None,
            },
        ];

        let good = DVector::from_vec(vec![0.9, 1000.0, 1e-3]);
        assert_eq!(eliminated_reason(&layout, model, &good), None);

        let runaway_kex = DVector::from_vec(vec![0.9, 3.0e6, 1e-3]);
        assert!(eliminated_reason(&layout, model, &runaway_kex).is_some());

        let minor_pa = DVector::from_vec(vec![0.4, 1000.0, 1e-3]);
        assert!(eliminated_reason(&layout, model, &minor_pa).is_some());

        let saturated_pa = DVector::from_vec(vec![1.0, 1000.0, 1e-3]);
        assert!(eliminated_reason(&layout, model, &saturated_pa).is_some());

        let slow_tex = DVector::from_vec(vec![0.9, 1000.0, 2.0]);
        assert!(eliminated_reason(&layout, model, &slow_tex).is_some());

        let skewed = registry::get("IT99").unwrap();
        let mid_pa = DVector::from_vec(vec![0.7, 1000.0, 1e-3]);
        assert_eq!(eliminated_reason(&layout, model, &mid_pa), None);
        assert!(eliminated_reason(&layout, skewed, &mid_pa).is_some());
    }
}
