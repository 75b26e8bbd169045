//! The chi-squared objective over the external physics seam.
//!
//! The engine never evaluates lineshape equations itself: it hands a
//! resolved named-parameter view to a [`DispersionModel`] implementation and
//! sums squared residuals. Non-finite predictions are mapped to a large
//! finite sentinel so the search continues instead of aborting.

use std::collections::HashMap;
use std::sync::Mutex;

use nalgebra::DVector;

use crate::core::models::cluster::Cluster;
use crate::core::models::dataset::Dataset;
use crate::core::models::params::Param;
use crate::core::models::spin::Measurement;

use super::constraints::PointFilter;
use super::indexer::ParamIndex;

/// Cost assigned to constraint-violating or numerically broken evaluations.
pub const COST_SENTINEL: f64 = 1.0e100;

/// A scalar cost over a flat parameter vector.
pub trait CostFunction: Sync {
    fn eval(&self, x: &DVector<f64>) -> f64;
}

impl<F> CostFunction for F
where
    F: Fn(&DVector<f64>) -> f64 + Sync,
{
    fn eval(&self, x: &DVector<f64>) -> f64 {
        self(x)
    }
}

/// The named parameters visible to the forward model at one data point:
/// cluster-scoped values, the owning spin's scalars, and the keyed value
/// for the point's condition key.
#[derive(Debug, Clone, Default)]
pub struct PointParams {
    values: HashMap<Param, f64>,
}

impl PointParams {
    pub fn get(&self, param: Param) -> Option<f64> {
        self.values.get(&param).copied()
    }

    /// Value of a parameter, defaulting to 0.0 when the model does not fit
    /// it. Mirrors the assembler's missing-value convention.
    pub fn get_or_zero(&self, param: Param) -> f64 {
        self.get(param).unwrap_or(0.0)
    }

    pub fn set(&mut self, param: Param, value: f64) {
        self.values.insert(param, value);
    }
}

/// The external physics seam: computes the predicted effective rate for one
/// data point given the resolved parameters. Implementations must be
/// stateless between calls.
pub trait DispersionModel: Sync {
    fn predict(&self, spin: &str, params: &PointParams, x: f64) -> f64;
}

/// Immutable per-spin data captured into a work-item snapshot.
#[derive(Debug, Clone)]
pub struct SpinSnapshot {
    pub name: String,
    pub measurements: Vec<Measurement>,
}

/// Immutable snapshot of everything a worker needs to evaluate a cluster's
/// objective: the selected spins' data and the flat-vector layout.
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    pub spins: Vec<SpinSnapshot>,
    pub layout: Vec<ParamIndex>,
}

impl ClusterSnapshot {
    pub fn capture(dataset: &Dataset, cluster: &Cluster, layout: Vec<ParamIndex>) -> Self {
        let spins = dataset
            .selected_spins(cluster)
            .into_iter()
            .map(|(_, spin)| SpinSnapshot {
                name: spin.name.clone(),
                measurements: spin.measurements.clone(),
            })
            .collect();
        Self { spins, layout }
    }

    /// A copy with one synthetic observation vector per spin, in measurement
    /// order. Used by the Monte Carlo loop.
    pub fn with_observations(&self, observations: &[Vec<f64>]) -> Self {
        let spins = self
            .spins
            .iter()
            .zip(observations)
            .map(|(spin, ys)| SpinSnapshot {
                name: spin.name.clone(),
                measurements: spin
                    .measurements
                    .iter()
                    .zip(ys)
                    .map(|(m, &y)| Measurement { y, ..*m })
                    .collect(),
            })
            .collect();
        Self {
            spins,
            layout: self.layout.clone(),
        }
    }

    /// Resolve the named parameters seen by spin `spin_index` at measurement
    /// `m` from a physical flat vector.
    fn point_params(&self, spin_index: usize, m: &Measurement, physical: &DVector<f64>) -> PointParams {
        let mut params = PointParams::default();
        for slot in &self.layout {
            let owned = match slot.spin {
                None => true,
                Some(s) => s == spin_index,
            };
            let keyed = match slot.key {
                None => true,
                Some(k) => k == m.key,
            };
            if owned && keyed {
                params.set(slot.param, physical[slot.index]);
            }
        }
        params
    }
}

/// Chi-squared objective for one cluster.
///
/// When constructed with a scaling matrix, `eval` expects scaled
/// coordinates and unscales before calling the forward model; the grid
/// search constructs it without scaling and works in physical coordinates.
/// When a [`PointFilter`] is attached, violating points cost the sentinel.
pub struct Chi2Objective<'a, M: DispersionModel + ?Sized> {
    snapshot: &'a ClusterSnapshot,
    model: &'a M,
    scaling: Option<DVector<f64>>,
    filter: Option<&'a PointFilter>,
    back_calc: Mutex<HashMap<String, Vec<f64>>>,
}

impl<'a, M: DispersionModel + ?Sized> Chi2Objective<'a, M> {
    pub fn new(snapshot: &'a ClusterSnapshot, model: &'a M) -> Self {
        Self {
            snapshot,
            model,
            scaling: None,
            filter: None,
            back_calc: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_scaling(mut self, scaling: DVector<f64>) -> Self {
        self.scaling = Some(scaling);
        self
    }

    pub fn with_filter(mut self, filter: &'a PointFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    fn to_physical(&self, x: &DVector<f64>) -> DVector<f64> {
        match &self.scaling {
            Some(scaling) => x.component_mul(scaling),
            None => x.clone(),
        }
    }

    fn chi2(&self, physical: &DVector<f64>) -> f64 {
        let mut chi2 = 0.0;
        for (spin_index, spin) in self.snapshot.spins.iter().enumerate() {
            for m in &spin.measurements {
                let params = self.snapshot.point_params(spin_index, m, physical);
                let predicted = self.model.predict(&spin.name, &params, m.x);
                if !predicted.is_finite() {
                    return COST_SENTINEL;
                }
                let residual = (m.y - predicted) / m.error;
                chi2 += residual * residual;
            }
        }
        if chi2.is_finite() { chi2 } else { COST_SENTINEL }
    }

    /// Back-calculate the predicted curve for one named spin at a physical
    /// point, without performing any search. The curve is also retained in
    /// the side channel for later retrieval.
    pub fn back_calc_spin(&self, spin_name: &str, physical: &DVector<f64>) -> Option<Vec<f64>> {
        let (spin_index, spin) = self
            .snapshot
            .spins
            .iter()
            .enumerate()
            .find(|(_, s)| s.name == spin_name)?;
        let curve: Vec<f64> = spin
            .measurements
            .iter()
            .map(|m| {
                let params = self.snapshot.point_params(spin_index, m, physical);
                self.model.predict(&spin.name, &params, m.x)
            })
            .collect();
        self.back_calc
            .lock()
            .expect("back-calc side channel poisoned")
            .insert(spin_name.to_string(), curve.clone());
        Some(curve)
    }

    /// Back-calculated curves for every spin in the snapshot.
    pub fn back_calc_all(&self, physical: &DVector<f64>) -> Vec<Vec<f64>> {
        self.snapshot
            .spins
            .iter()
            .map(|spin| {
                self.back_calc_spin(&spin.name, physical)
                    .unwrap_or_default()
            })
            .collect()
    }

    /// The curves retained by previous back-calculation calls.
    pub fn retained_curves(&self) -> HashMap<String, Vec<f64>> {
        self.back_calc
            .lock()
            .expect("back-calc side channel poisoned")
            .clone()
    }
}

impl<'a, M: DispersionModel + ?Sized> CostFunction for Chi2Objective<'a, M> {
    fn eval(&self, x: &DVector<f64>) -> f64 {
        let physical = self.to_physical(x);
        if let Some(filter) = self.filter {
            if !filter.accepts(&physical) {
                return COST_SENTINEL;
            }
        }
        self.chi2(&physical)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::core::models::params::ConditionKey;

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

    fn line_model() -> LineModel {
        LineModel {
            slope_param: Param::Kex,
            intercept_param: Param::R2,
        }
    }

    #[test]
    fn chi2_is_zero_at_the_generating_parameters() {
        let points: Vec<(f64, f64, f64)> = (0..5)
            .map(|i| {
                let x = i as f64;
                (x, 3.0 + 2.0 * x, 0.5)
            })
            .collect();
        let snapshot = snapshot_from_points(&points, line_layout());
        let model = line_model();
        let objective = Chi2Objective::new(&snapshot, &model);

        let exact = DVector::from_vec(vec![3.0, 2.0]);
        assert!(objective.eval(&exact) < 1e-20);
        assert!(objective.eval(&DVector::from_vec(vec![3.0, 2.5])) > 0.0);
    }

    #[test]
    fn non_finite_predictions_cost_the_sentinel() {
        struct BrokenModel;
        impl DispersionModel for BrokenModel {
            fn predict(&self, _: &str, _: &PointParams, _: f64) -> f64 {
                f64::NAN
            }
        }
        let snapshot = snapshot_from_points(&[(1.0, 1.0, 0.1)], line_layout());
        let objective = Chi2Objective::new(&snapshot, &BrokenModel);
        assert_eq!(objective.eval(&DVector::from_vec(vec![0.0, 0.0])), COST_SENTINEL);
    }

    #[test]
    fn scaled_objective_unscales_before_predicting() {
        let points = [(1.0, 3.0 + 2.0, 0.5)];
        let snapshot = snapshot_from_points(&points, line_layout());
        let model = line_model();
        let scaling = DVector::from_vec(vec![3.0, 2.0]);
        let objective = Chi2Objective::new(&snapshot, &model).with_scaling(scaling);

        // Scaled (1, 1) is physical (3, 2), which fits the single point.
        assert!(objective.eval(&DVector::from_vec(vec![1.0, 1.0])) < 1e-20);
    }

    #[test]
    fn back_calc_populates_the_side_channel_without_searching() {
        let points = [(0.0, 99.0, 1.0), (1.0, 99.0, 1.0)];
        let snapshot = snapshot_from_points(&points, line_layout());
        let model = line_model();
        let objective = Chi2Objective::new(&snapshot, &model);

        let curve = objective
            .back_calc_spin("test", &DVector::from_vec(vec![3.0, 2.0]))
            .unwrap();
        assert_eq!(curve, vec![3.0, 5.0]);
        assert_eq!(objective.retained_curves()["test"], vec![3.0, 5.0]);
        assert!(objective.back_calc_spin("absent", &DVector::from_vec(vec![0.0, 0.0])).is_none());
    }
}
