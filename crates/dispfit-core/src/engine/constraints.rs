//! Linear inequality constraints `A·x ≥ b` over the scaled flat vector.
//!
//! Rows are built in the coordinate system already divided by the scaling
//! matrix entry of each slot: a single-variable bound `x_i ≥ L` becomes a
//! unit row with `b = L / s_i`, and a multi-variable row `Σ c_i·x_i ≥ L`
//! keeps `b = L` with coefficients `c_i · s_i`. Getting this division wrong
//! silently violates physical bounds, so both forms are covered by tests.

use nalgebra::{DMatrix, DVector};

use crate::core::models::params::{Param, ParamCategory};
use crate::core::registry::{ExperimentFamily, ModelInfo, PopulationPolicy};

use super::indexer::ParamIndex;

/// Relaxation-rate cap for CPMG-family models, s^-1.
pub const RATE_CAP_CPMG: f64 = 200.0;
/// Relaxation-rate cap for R1rho-family models, s^-1.
pub const RATE_CAP_R1RHO: f64 = 6000.0;
/// Fallback cap for rate categories without a documented limit.
pub const RATE_CAP_FALLBACK: f64 = 2.0e6;

/// Lower bound of the dominant population.
pub const PA_LOWER: f64 = 0.5;
/// Tightened lower bound under the skewed-population policy.
pub const PA_LOWER_SKEWED: f64 = 0.85;

#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSet {
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
}

impl ConstraintSet {
    pub fn rows(&self) -> usize {
        self.a.nrows()
    }

    /// Index of the first violated row for a scaled point, if any.
    pub fn first_violation(&self, scaled: &DVector<f64>) -> Option<usize> {
        let residual = &self.a * scaled - &self.b;
        residual.iter().position(|r| *r < -1e-12)
    }

    pub fn satisfied(&self, scaled: &DVector<f64>) -> bool {
        self.first_violation(scaled).is_none()
    }
}

/// A constraint filter over physical points: scales each candidate, then
/// tests the constraint set. Used by the grid search to prune points before
/// the objective is evaluated, and as the penalty test during refinement.
#[derive(Debug, Clone)]
pub struct PointFilter {
    pub constraints: ConstraintSet,
    pub scaling: Option<DVector<f64>>,
}

impl PointFilter {
    pub fn accepts(&self, physical: &DVector<f64>) -> bool {
        match &self.scaling {
            Some(scaling) => self
                .constraints
                .satisfied(&physical.component_div(scaling)),
            None => self.constraints.satisfied(physical),
        }
    }
}

fn rate_cap(family: ExperimentFamily) -> f64 {
    match family {
        ExperimentFamily::Cpmg => RATE_CAP_CPMG,
        ExperimentFamily::R1Rho => RATE_CAP_R1RHO,
    }
}

/// Build the constraint set for a cluster's layout, aligned to the flat
/// vector and adjusted for the scaling matrix (`None` means all scales 1).
pub fn build(
    layout: &[ParamIndex],
    model: &ModelInfo,
    scaling: Option<&DVector<f64>>,
) -> ConstraintSet {
    let n = layout.len();
    let scale = |i: usize| scaling.map_or(1.0, |s| s[i]);

    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut bounds: Vec<f64> = Vec::new();

    let mut single = |i: usize, sign: f64, bound: f64| {
        let mut row = vec![0.0; n];
        row[i] = sign;
        rows.push(row);
        bounds.push(bound / scale(i));
    };

    let mut pa_slot = None;
    let mut pb_slot = None;

    for slot in layout {
        let i = slot.index;
        match slot.param.descriptor().category {
            ParamCategory::Rate => {
                single(i, 1.0, 0.0);
                single(i, -1.0, -rate_cap(model.family));
            }
            ParamCategory::ExchangeRate | ParamCategory::TimeConstant => {
                single(i, 1.0, 0.0);
                single(i, -1.0, -RATE_CAP_FALLBACK);
            }
            ParamCategory::ShiftDifference | ParamCategory::ExchangeContribution => {
                single(i, 1.0, 0.0);
            }
            ParamCategory::Population => match slot.param {
                Param::PA => {
                    let lower = match model.population_policy {
                        PopulationPolicy::Free => PA_LOWER,
                        PopulationPolicy::Skewed => PA_LOWER_SKEWED,
                    };
                    single(i, 1.0, lower);
                    single(i, -1.0, -1.0);
                    pa_slot = Some(i);
                }
                _ => {
                    single(i, 1.0, 0.0);
                    pb_slot = Some(i);
                }
            },
        }
    }

    // Three-state ordering: pA >= pB >= pC >= 0 with pC = 1 - pA - pB.
    // Multi-variable rows carry the scale on the coefficients.
    if let (Some(pa), Some(pb)) = (pa_slot, pb_slot) {
        let (sa, sb) = (scale(pa), scale(pb));

        let mut ordering = vec![0.0; n];
        ordering[pa] = sa;
        ordering[pb] = -sb;
        rows.push(ordering);
        bounds.push(0.0);

        let mut above_floor = vec![0.0; n];
        above_floor[pa] = sa;
        above_floor[pb] = 2.0 * sb;
        rows.push(above_floor);
        bounds.push(1.0);

        let mut complement = vec![0.0; n];
        complement[pa] = -sa;
        complement[pb] = -sb;
        rows.push(complement);
        bounds.push(-1.0);
    }

    let a = DMatrix::from_fn(rows.len(), n, |r, c| rows[r][c]);
    let b = DVector::from_vec(bounds);
    ConstraintSet { a, b }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::params::ConditionKey;
    use crate::core::registry;

    fn slot(param: Param, index: usize, spin: Option<usize>, key: Option<usize>) -> ParamIndex {
        ParamIndex {
            param,
            index,
            spin,
            key: key.map(ConditionKey),
        }
    }

    #[test]
    fn rate_bound_is_divided_by_scale_not_multiplied() {
        // Two-parameter model with a known scaling matrix: the cap of 200
        // with a scale of 10 must appear as 20 in the bound vector.
        let layout = [
            slot(Param::R2, 0, Some(0), Some(0)),
            slot(Param::Kex, 1, None, None),
        ];
        let model = registry::get("CR72").unwrap();
        let scaling = DVector::from_vec(vec![10.0, 1.0e4]);
        let set = build(&layout, model, Some(&scaling));

        // Row 1 is the r2 upper bound: -x >= -cap/scale.
        assert_eq!(set.a[(1, 0)], -1.0);
        assert_eq!(set.b[1], -(RATE_CAP_CPMG / 10.0));
        assert_eq!(set.b[1], -20.0);

        // Scaled point at the physical cap satisfies; just above violates.
        let at_cap = DVector::from_vec(vec![200.0 / 10.0, 0.0]);
        assert!(set.satisfied(&at_cap));
        let over = DVector::from_vec(vec![201.0 / 10.0, 0.0]);
        assert_eq!(set.first_violation(&over), Some(1));
    }

    #[test]
    fn family_selects_the_rate_cap() {
        let layout = [slot(Param::R1RhoPrime, 0, Some(0), Some(0))];
        let set = build(&layout, registry::get("TP02").unwrap(), None);
        assert_eq!(set.b[1], -RATE_CAP_R1RHO);
    }

    #[test]
    fn population_rows_encode_ordering_and_floor() {
        let model = registry::get("NS MMQ 3-site").unwrap();
        let layout = [
            slot(Param::PA, 0, None, None),
            slot(Param::PB, 1, None, None),
        ];
        let set = build(&layout, model, None);

        let ok = DVector::from_vec(vec![0.6, 0.25]); // pC = 0.15
        assert!(set.satisfied(&ok));

        // pB > pA violates the ordering row.
        let swapped = DVector::from_vec(vec![0.55, 0.56]);
        assert!(!set.satisfied(&swapped));

        // pC = 1 - pA - pB > pB violates the floor row.
        let below_floor = DVector::from_vec(vec![0.5, 0.1]);
        assert!(!set.satisfied(&below_floor));

        // Populations summing above one violate the complement row.
        let overfull = DVector::from_vec(vec![0.9, 0.2]);
        assert!(!set.satisfied(&overfull));
    }

    #[test]
    fn skewed_policy_raises_the_dominant_population_floor() {
        let layout = [slot(Param::PA, 0, None, None)];
        let skew = build(&layout, registry::get("IT99").unwrap(), None);
        let free = build(&layout, registry::get("CR72").unwrap(), None);

        let mid = DVector::from_vec(vec![0.7]);
        assert!(free.satisfied(&mid));
        assert!(!skew.satisfied(&mid));
        assert!(skew.satisfied(&DVector::from_vec(vec![0.9])));
    }

    #[test]
    fn point_filter_scales_before_testing() {
        let layout = [slot(Param::R2, 0, Some(0), Some(0))];
        let model = registry::get("CR72").unwrap();
        let scaling = DVector::from_vec(vec![10.0]);
        let filter = PointFilter {
            constraints: build(&layout, model, Some(&scaling)),
            scaling: Some(scaling),
        };
        assert!(filter.accepts(&DVector::from_vec(vec![150.0])));
        assert!(!filter.accepts(&DVector::from_vec(vec![250.0])));
    }
}
