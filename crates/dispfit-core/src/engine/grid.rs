//! Discretized grid search with constraint and sparsity pruning.
//!
//! Points are visited in a fixed odometer order with dimension 0 as the
//! fastest-varying counter, consistent with how increments are constructed.
//! Every point is first tested against the linear constraints and the
//! model's sparse-skip rules; only surviving points reach the objective.

use nalgebra::DVector;
use tracing::{debug, instrument};

use super::constraints::PointFilter;
use super::error::EngineError;
use super::objective::CostFunction;

/// Hard ceiling on the total number of grid points. Searches above it fail
/// fast before any allocation or evaluation.
pub const GRID_POINT_CEILING: u128 = 100_000_000;

/// One grid dimension: an inclusive linspace over `[lower, upper]` with
/// `increments` points.
#[derive(Debug, Clone, PartialEq)]
pub struct GridDimension {
    pub lower: f64,
    pub upper: f64,
    pub increments: usize,
}

impl GridDimension {
    pub fn value(&self, step: usize) -> f64 {
        if self.increments < 2 {
            return self.lower;
        }
        let fraction = step as f64 / (self.increments - 1) as f64;
        self.lower + (self.upper - self.lower) * fraction
    }
}

/// A sparsity rule over two dimensions: while `driver` sits at its
/// reference (first) increment, varying `decoupled` is redundant and those
/// points are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipRule {
    pub driver: usize,
    pub decoupled: usize,
}

/// The point set to search: a Cartesian product of per-dimension increment
/// lists, or a pre-enumerated point list (as produced by sharding).
#[derive(Debug, Clone)]
pub enum GridPoints {
    Linear(Vec<GridDimension>),
    Preset(Vec<DVector<f64>>),
}

#[derive(Debug, Clone)]
pub struct GridSpec {
    pub points: GridPoints,
    pub skip: Vec<SkipRule>,
}

impl GridSpec {
    pub fn linear(dimensions: Vec<GridDimension>) -> Self {
        Self {
            points: GridPoints::Linear(dimensions),
            skip: Vec::new(),
        }
    }

    pub fn preset(points: Vec<DVector<f64>>) -> Self {
        Self {
            points: GridPoints::Preset(points),
            skip: Vec::new(),
        }
    }

    pub fn with_skip(mut self, skip: Vec<SkipRule>) -> Self {
        self.skip = skip;
        self
    }

    pub fn total_points(&self) -> u128 {
        match &self.points {
            GridPoints::Linear(dims) => dims
                .iter()
                .fold(1u128, |acc, d| acc.saturating_mul(d.increments as u128)),
            GridPoints::Preset(points) => points.len() as u128,
        }
    }

    fn check_ceiling(&self) -> Result<(), EngineError> {
        let points = self.total_points();
        if points > GRID_POINT_CEILING {
            return Err(EngineError::GridTooLarge {
                points,
                ceiling: GRID_POINT_CEILING,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GridOutcome {
    pub best: DVector<f64>,
    pub cost: f64,
    pub evaluated: u64,
    pub skipped: u64,
    pub note: Option<&'static str>,
}

fn skip_by_rules(rules: &[SkipRule], counters: &[usize]) -> bool {
    rules
        .iter()
        .any(|rule| counters[rule.driver] == 0 && counters[rule.decoupled] != 0)
}

/// Search every grid point exactly once, returning the running best.
///
/// A search over zero free parameters short-circuits to a single objective
/// evaluation at the empty vector.
#[instrument(skip_all, name = "grid_search", fields(points = %spec.total_points()))]
pub fn search<C: CostFunction + ?Sized>(
    spec: &GridSpec,
    filter: Option<&PointFilter>,
    objective: &C,
) -> Result<GridOutcome, EngineError> {
    spec.check_ceiling()?;

    let mut best: Option<DVector<f64>> = None;
    let mut best_cost = f64::INFINITY;
    let mut evaluated = 0u64;
    let mut skipped = 0u64;

    let mut consider = |point: DVector<f64>| {
        let cost = objective.eval(&point);
        evaluated += 1;
        if cost < best_cost {
            best_cost = cost;
            best = Some(point);
        }
    };

    match &spec.points {
        GridPoints::Linear(dims) if dims.is_empty() => {
            debug!("Grid over zero free parameters: single evaluation.");
            let cost = objective.eval(&DVector::zeros(0));
            return Ok(GridOutcome {
                best: DVector::zeros(0),
                cost,
                evaluated: 1,
                skipped: 0,
                note: Some("no optimization performed"),
            });
        }
        GridPoints::Linear(dims) => {
            let n = dims.len();
            let mut counters = vec![0usize; n];
            'odometer: loop {
                if skip_by_rules(&spec.skip, &counters) {
                    skipped += 1;
                } else {
                    let point = DVector::from_iterator(
                        n,
                        counters.iter().zip(dims).map(|(&c, d)| d.value(c)),
                    );
                    if filter.is_some_and(|f| !f.accepts(&point)) {
                        skipped += 1;
                    } else {
                        consider(point);
                    }
                }

                // Advance the odometer, dimension 0 fastest.
                let mut dim = 0;
                loop {
                    counters[dim] += 1;
                    if counters[dim] < dims[dim].increments {
                        break;
                    }
                    counters[dim] = 0;
                    dim += 1;
                    if dim == n {
                        break 'odometer;
                    }
                }
            }
        }
        GridPoints::Preset(points) => {
            for point in points {
                if filter.is_some_and(|f| !f.accepts(point)) {
                    skipped += 1;
                } else {
                    consider(point.clone());
                }
            }
        }
    }

    debug!(evaluated, skipped, best_cost, "Grid search finished.");
    match best {
        Some(best) => Ok(GridOutcome {
            best,
            cost: best_cost,
            evaluated,
            skipped,
            note: None,
        }),
        None => Ok(GridOutcome {
            best: DVector::zeros(match &spec.points {
                GridPoints::Linear(dims) => dims.len(),
                GridPoints::Preset(points) => points.first().map_or(0, |p| p.len()),
            }),
            cost: f64::INFINITY,
            evaluated,
            skipped,
            note: Some("all grid points filtered out"),
        }),
    }
}

/// Enumerate the filtered point set in search order, for sharding.
pub fn enumerate_filtered(
    spec: &GridSpec,
    filter: Option<&PointFilter>,
) -> Result<Vec<DVector<f64>>, EngineError> {
    spec.check_ceiling()?;
    let mut points = Vec::new();

    match &spec.points {
        GridPoints::Linear(dims) if dims.is_empty() => {}
        GridPoints::Linear(dims) => {
            let n = dims.len();
            let mut counters = vec![0usize; n];
            'odometer: loop {
                if !skip_by_rules(&spec.skip, &counters) {
                    let point = DVector::from_iterator(
                        n,
                        counters.iter().zip(dims).map(|(&c, d)| d.value(c)),
                    );
                    if !filter.is_some_and(|f| !f.accepts(&point)) {
                        points.push(point);
                    }
                }
                let mut dim = 0;
                loop {
                    counters[dim] += 1;
                    if counters[dim] < dims[dim].increments {
                        break;
                    }
                    counters[dim] = 0;
                    dim += 1;
                    if dim == n {
                        break 'odometer;
                    }
                }
            }
        }
        GridPoints::Preset(source) => {
            for point in source {
                if !filter.is_some_and(|f| !f.accepts(point)) {
                    points.push(point.clone());
                }
            }
        }
    }
    Ok(points)
}

/// Split a point set into `count` contiguous, near-equal shards; the last
/// shard absorbs any remainder.
pub fn shard(points: Vec<DVector<f64>>, count: usize) -> Vec<Vec<DVector<f64>>> {
    if count <= 1 {
        return vec![points];
    }
    let base = points.len() / count;
    let mut shards = Vec::with_capacity(count);
    let mut rest = points;
    for _ in 0..count - 1 {
        let tail = rest.split_off(base.min(rest.len()));
        shards.push(std::mem::replace(&mut rest, tail));
    }
    shards.push(rest);
    shards
}
