//! Fork-join dispatch of per-cluster work items.
//!
//! The master builds a flat queue of independent jobs (whole grids, grid
//! shards, simplex refinements), hands it to the worker pool, and merges
//! the outcomes per cluster by strict cost improvement. Workers receive an
//! immutable snapshot and never touch the dataset; all write-back happens
//! on the master after the merge.

use std::collections::BTreeMap;

use nalgebra::DVector;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, instrument};

use super::constraints::PointFilter;
use super::error::EngineError;
use super::grid::{self, GridSpec};
use super::minimize::{self, SimplexSettings};
use super::objective::{Chi2Objective, ClusterSnapshot, DispersionModel};
use super::progress::{Progress, ProgressReporter};

/// The work a single job performs.
#[derive(Debug, Clone)]
pub enum JobKind {
    /// Walk a full grid specification point by point.
    GridStream { spec: GridSpec },
    /// Evaluate one pre-enumerated shard of a larger grid.
    GridShard { points: Vec<DVector<f64>> },
    /// Simplex refinement from a physical starting point.
    Refine { start: DVector<f64> },
}

/// One independent unit of work over a cluster snapshot. `scaling` holds
/// the diagonal of the scaling matrix; grids always run in physical
/// coordinates, refinement in scaled ones.
pub struct WorkItem {
    pub cluster_index: usize,
    pub snapshot: ClusterSnapshot,
    pub kind: JobKind,
    pub scaling: Option<DVector<f64>>,
    pub filter: Option<PointFilter>,
    pub simplex: SimplexSettings,
}

/// Result of one job, in physical coordinates.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub cluster_index: usize,
    pub best: DVector<f64>,
    pub cost: f64,
    pub iterations: usize,
    pub evaluations: u64,
    pub warning: Option<String>,
    pub note: Option<&'static str>,
}

/// The per-cluster merge of every finished job.
#[derive(Debug, Clone)]
pub struct ClusterBest {
    pub cluster_index: usize,
    pub best: DVector<f64>,
    pub cost: f64,
    pub iterations: usize,
    pub evaluations: u64,
    pub warning: Option<String>,
    pub note: Option<&'static str>,
}

fn execute<M: DispersionModel + ?Sized>(
    item: &WorkItem,
    physics: &M,
) -> Result<JobOutcome, EngineError> {
    match &item.kind {
        JobKind::GridStream { spec } => {
            let objective = Chi2Objective::new(&item.snapshot, physics);
            let outcome = grid::search(spec, item.filter.as_ref(), &objective)?;
            Ok(JobOutcome {
                cluster_index: item.cluster_index,
                best: outcome.best,
                cost: outcome.cost,
                iterations: 0,
                evaluations: outcome.evaluated,
                warning: None,
                note: outcome.note,
            })
        }
        JobKind::GridShard { points } => {
            let objective = Chi2Objective::new(&item.snapshot, physics);
            let spec = GridSpec::preset(points.clone());
            let outcome = grid::search(&spec, item.filter.as_ref(), &objective)?;
            Ok(JobOutcome {
                cluster_index: item.cluster_index,
                best: outcome.best,
                cost: outcome.cost,
                iterations: 0,
                evaluations: outcome.evaluated,
                warning: None,
                note: outcome.note,
            })
        }
        JobKind::Refine { start } => {
            let mut objective = Chi2Objective::new(&item.snapshot, physics);
            if let Some(filter) = &item.filter {
                objective = objective.with_filter(filter);
            }
            let scaled_start = match &item.scaling {
                Some(scaling) => {
                    objective = objective.with_scaling(scaling.clone());
                    start.component_div(scaling)
                }
                None => start.clone(),
            };
            let outcome = minimize::nelder_mead(&objective, scaled_start, &item.simplex);
            let best = match &item.scaling {
                Some(scaling) => outcome.x.component_mul(scaling),
                None => outcome.x,
            };
            Ok(JobOutcome {
                cluster_index: item.cluster_index,
                best,
                cost: outcome.cost,
                iterations: outcome.iterations,
                evaluations: outcome.evaluations,
                warning: outcome.warning,
                note: None,
            })
        }
    }
}

/// Run every item of the queue, in parallel when the `parallel` feature is
/// active, serially otherwise. Item order within the result is unspecified;
/// the merge is order-insensitive. Each finished job reports one
/// [`Progress::TaskIncrement`] when a reporter is supplied.
#[instrument(skip_all, name = "dispatch", fields(jobs = items.len()))]
pub fn run_queue<M: DispersionModel + ?Sized>(
    items: Vec<WorkItem>,
    physics: &M,
    reporter: Option<&ProgressReporter>,
) -> Result<Vec<JobOutcome>, EngineError> {
    let run = |item: &WorkItem| {
        let outcome = execute(item, physics)?;
        if let Some(reporter) = reporter {
            reporter.report(Progress::TaskIncrement);
        }
        Ok(outcome)
    };
    #[cfg(feature = "parallel")]
    {
        items.par_iter().map(run).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        items.iter().map(run).collect()
    }
}

/// Merge job outcomes per cluster, keeping only strict cost improvements.
/// Evaluation and iteration counters accumulate across every job of a
/// cluster; warnings from discarded jobs are dropped with their results.
pub fn merge(outcomes: Vec<JobOutcome>) -> BTreeMap<usize, ClusterBest> {
    let mut merged: BTreeMap<usize, ClusterBest> = BTreeMap::new();
    for outcome in outcomes {
        match merged.get_mut(&outcome.cluster_index) {
            None => {
                merged.insert(
                    outcome.cluster_index,
                    ClusterBest {
                        cluster_index: outcome.cluster_index,
                        best: outcome.best,
                        cost: outcome.cost,
                        iterations: outcome.iterations,
                        evaluations: outcome.evaluations,
                        warning: outcome.warning,
                        note: outcome.note,
                    },
                );
            }
            Some(entry) => {
                entry.evaluations += outcome.evaluations;
                entry.iterations += outcome.iterations;
                if outcome.cost < entry.cost {
                    entry.best = outcome.best;
                    entry.cost = outcome.cost;
                    entry.warning = outcome.warning;
                    entry.note = outcome.note;
                } else {
                    debug!(
                        cluster = outcome.cluster_index,
                        cost = outcome.cost,
                        retained = entry.cost,
                        "Discarding job result without improvement."
                    );
                }
            }
        }
    }
    merged
}
