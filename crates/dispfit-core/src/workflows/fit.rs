//! The complete clustered fit of one dispersion model.
//!
//! Phase sequence: validation, optional nesting from a previously fit
//! model, per-cluster grid search (dispatched, optionally sharded), simplex
//! refinement (dispatched), disassembly back onto the spins, and the
//! optional Monte Carlo error loop. Only this layer writes to the dataset;
//! workers operate on immutable snapshots throughout.

use nalgebra::DVector;
use tracing::{debug, info, instrument};

use crate::core::models::cluster::Cluster;
use crate::core::models::dataset::Dataset;
use crate::core::registry::{self, ModelInfo};
use crate::engine::config::FitConfig;
use crate::engine::constraints::{self, PointFilter};
use crate::engine::context::FitContext;
use crate::engine::dispatch::{self, JobKind, WorkItem};
use crate::engine::error::EngineError;
use crate::engine::grid::{self, GridDimension, GridSpec, SkipRule, GRID_POINT_CEILING};
use crate::engine::indexer::{self, ParamIndex};
use crate::engine::minimize::SimplexSettings;
use crate::engine::monte_carlo;
use crate::engine::nesting::{self, NestingOutcome};
use crate::engine::objective::{ClusterSnapshot, DispersionModel};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::vector;

/// The fitted state of one cluster.
#[derive(Debug, Clone)]
pub struct ClusterFit {
    pub cluster_index: usize,
    /// Names of the selected spins, in cluster order.
    pub spins: Vec<String>,
    pub layout: Vec<ParamIndex>,
    /// Fitted values in physical units, aligned to `layout`.
    pub values: DVector<f64>,
    pub chi2: f64,
    pub iterations: usize,
    pub evaluations: u64,
    pub warning: Option<String>,
    pub note: Option<&'static str>,
    pub monte_carlo: Option<MonteCarloSummary>,
}

#[derive(Debug, Clone, Copy)]
pub struct MonteCarloSummary {
    pub kept: usize,
    pub eliminated: usize,
}

#[derive(Debug, Clone)]
pub struct FitReport {
    pub model: &'static str,
    pub clusters: Vec<ClusterFit>,
}

/// Per-cluster working state carried across the phases.
struct Plan {
    index: usize,
    cluster: Cluster,
    layout: Vec<ParamIndex>,
    snapshot: ClusterSnapshot,
    scaling: Option<DVector<f64>>,
    filter: Option<PointFilter>,
    nesting: NestingOutcome,
    best: DVector<f64>,
    chi2: f64,
    iterations: usize,
    evaluations: u64,
    warning: Option<String>,
    note: Option<&'static str>,
    monte_carlo: Option<MonteCarloSummary>,
}

fn simplex_settings(config: &FitConfig) -> SimplexSettings {
    SimplexSettings {
        max_iterations: config.minimiser.max_iterations,
        tolerance: config.minimiser.tolerance,
    }
}

/// Map a model's sparse pairs onto skip rules over the free grid
/// dimensions. A pair only applies when both of its parameters are on the
/// grid; per-spin decoupled parameters contribute one rule per spin.
fn skip_rules(layout: &[ParamIndex], free: &[usize], model: &ModelInfo) -> Vec<SkipRule> {
    let positions = |param| -> Vec<usize> {
        free.iter()
            .enumerate()
            .filter(|&(_, &slot)| layout[slot].param == param)
            .map(|(dim, _)| dim)
            .collect()
    };
    let mut rules = Vec::new();
    for pair in model.sparse_pairs {
        for &driver in &positions(pair.driver) {
            for &decoupled in &positions(pair.decoupled) {
                rules.push(SkipRule { driver, decoupled });
            }
        }
    }
    rules
}

/// Build the grid work items for one cluster. Seeded parameters stay fixed
/// at their translated values; the grid runs over the rest. Returns the
/// note to attach when nothing survives the constraint filter.
fn grid_jobs<M: DispersionModel + ?Sized>(
    ctx: &FitContext<M>,
    plan: &Plan,
    model: &'static ModelInfo,
    jobs: &mut Vec<WorkItem>,
) -> Result<Option<&'static str>, EngineError> {
    let free: Vec<usize> = plan
        .layout
        .iter()
        .filter(|slot| !plan.nesting.is_seeded(slot.param))
        .map(|slot| slot.index)
        .collect();
    let dims: Vec<GridDimension> = free
        .iter()
        .map(|&slot| {
            let (lower, upper) = registry::grid_bounds(plan.layout[slot].param, model.population_policy);
            GridDimension {
                lower,
                upper,
                increments: ctx.config.grid.increments,
            }
        })
        .collect();
    let spec = GridSpec::linear(dims).with_skip(skip_rules(&plan.layout, &free, model));

    let total = spec.total_points();
    if total > GRID_POINT_CEILING {
        return Err(EngineError::GridTooLarge {
            points: total,
            ceiling: GRID_POINT_CEILING,
        });
    }

    let full_grid = free.len() == plan.layout.len();
    if full_grid && ctx.config.grid.shards <= 1 {
        jobs.push(WorkItem {
            cluster_index: plan.index,
            snapshot: plan.snapshot.clone(),
            kind: JobKind::GridStream { spec },
            scaling: None,
            filter: plan.filter.clone(),
            simplex: simplex_settings(ctx.config),
        });
        return Ok(None);
    }

    // Embed free-dimension points into full vectors around the seeded
    // start, filter once, then shard.
    let mut points: Vec<DVector<f64>> = Vec::new();
    if free.is_empty() {
        points.push(plan.best.clone());
    } else {
        for free_point in grid::enumerate_filtered(&spec, None)? {
            let mut point = plan.best.clone();
            for (dim, &slot) in free.iter().enumerate() {
                point[slot] = free_point[dim];
            }
            if plan.filter.as_ref().map_or(true, |f| f.accepts(&point)) {
                points.push(point);
            }
        }
    }
    if points.is_empty() {
        return Ok(Some("all grid points filtered out"));
    }
    for shard in grid::shard(points, ctx.config.grid.shards) {
        if shard.is_empty() {
            continue;
        }
        jobs.push(WorkItem {
            cluster_index: plan.index,
            snapshot: plan.snapshot.clone(),
            kind: JobKind::GridShard { points: shard },
            scaling: None,
            filter: None,
            simplex: simplex_settings(ctx.config),
        });
    }
    Ok(None)
}

/// Fit `model_id` over every cluster of the dataset.
///
/// The model is assigned to every spin first; when `source_model_id` names
/// a previously fit model, each cluster's starting point is seeded through
/// the registry's nesting edges. Clusters without selected spins are
/// skipped.
#[instrument(skip_all, name = "fit", fields(model = model_id))]
pub fn run_fit<M: DispersionModel + ?Sized>(
    dataset: &mut Dataset,
    model_id: &str,
    source_model_id: Option<&str>,
    config: &FitConfig,
    physics: &M,
    reporter: &ProgressReporter,
) -> Result<FitReport, EngineError> {
    let model =
        registry::get(model_id).ok_or_else(|| EngineError::UnknownModel(model_id.to_string()))?;
    let source = source_model_id
        .map(|id| registry::get(id).ok_or_else(|| EngineError::UnknownModel(id.to_string())))
        .transpose()?;
    let ctx = FitContext::new(config, physics, reporter);

    ctx.reporter.report(Progress::PhaseStart { name: "validation" });
    for (_, spin) in dataset.spins.iter_mut() {
        spin.model = model.id.to_string();
    }
    let clusters = dataset.clusters.clone();
    ctx.reporter.report(Progress::PhaseFinish);

    ctx.reporter.report(Progress::PhaseStart { name: "nesting" });
    let mut plans: Vec<Plan> = Vec::new();
    for (index, cluster) in clusters.iter().enumerate() {
        if dataset.selected_spins(cluster).is_empty() {
            debug!(cluster = index, "Skipping cluster without selected spins.");
            continue;
        }
        let model = indexer::cluster_model(dataset, cluster, index)?;
        let nesting = match source {
            Some(source) => nesting::resolve(dataset, cluster, model, source)?,
            None => NestingOutcome::NoRelation,
        };

        let layout: Vec<ParamIndex> = indexer::cluster_params(dataset, cluster, model).collect();
        let snapshot = ClusterSnapshot::capture(dataset, cluster, layout.clone());
        let scaling = config
            .minimiser
            .scaling
            .then(|| vector::scaling_matrix(&layout));
        let filter = config.minimiser.constraints.then(|| PointFilter {
            constraints: constraints::build(&layout, model, scaling.as_ref()),
            scaling: scaling.clone(),
        });
        let best = vector::assemble(dataset, cluster, &layout);
        plans.push(Plan {
            index,
            cluster: cluster.clone(),
            layout,
            snapshot,
            scaling,
            filter,
            nesting,
            best,
            chi2: f64::INFINITY,
            iterations: 0,
            evaluations: 0,
            warning: None,
            note: None,
            monte_carlo: None,
        });
    }
    ctx.reporter.report(Progress::PhaseFinish);

    ctx.reporter.report(Progress::PhaseStart { name: "grid search" });
    let mut jobs = Vec::new();
    for plan in &mut plans {
        if !plan.nesting.grid_required() {
            debug!(cluster = plan.index, "Equivalent source model, grid skipped.");
            continue;
        }
        plan.note = grid_jobs(&ctx, plan, model, &mut jobs)?;
    }
    ctx.reporter.report(Progress::TaskStart {
        total_steps: jobs.len() as u64,
    });
    let outcomes = dispatch::run_queue(jobs, ctx.physics, Some(ctx.reporter))?;
    ctx.reporter.report(Progress::TaskFinish);
    let mut gridded = dispatch::merge(outcomes);
    for plan in &mut plans {
        if let Some(entry) = gridded.remove(&plan.index) {
            plan.evaluations += entry.evaluations;
            if entry.cost.is_finite() {
                plan.best = entry.best;
                plan.chi2 = entry.cost;
            }
            if plan.note.is_none() {
                plan.note = entry.note;
            }
        }
    }
    ctx.reporter.report(Progress::PhaseFinish);

    ctx.reporter.report(Progress::PhaseStart { name: "refinement" });
    // Infeasible starting points abort before any refinement is dispatched;
    // grid winners always pass since the filter pruned them already.
    for plan in &plans {
        if let Some(filter) = &plan.filter {
            let scaled = match &plan.scaling {
                Some(scaling) => plan.best.component_div(scaling),
                None => plan.best.clone(),
            };
            if let Some(row) = filter.constraints.first_violation(&scaled) {
                return Err(EngineError::InfeasibleStart {
                    cluster: plan.index,
                    row,
                });
            }
        }
    }
    let jobs: Vec<WorkItem> = plans
        .iter()
        .map(|plan| WorkItem {
            cluster_index: plan.index,
            snapshot: plan.snapshot.clone(),
            kind: JobKind::Refine {
                start: plan.best.clone(),
            },
            scaling: plan.scaling.clone(),
            filter: plan.filter.clone(),
            simplex: simplex_settings(config),
        })
        .collect();
    ctx.reporter.report(Progress::TaskStart {
        total_steps: jobs.len() as u64,
    });
    let outcomes = dispatch::run_queue(jobs, ctx.physics, Some(ctx.reporter))?;
    ctx.reporter.report(Progress::TaskFinish);
    let mut refined = dispatch::merge(outcomes);
    for plan in &mut plans {
        if let Some(entry) = refined.remove(&plan.index) {
            plan.evaluations += entry.evaluations;
            plan.iterations += entry.iterations;
            if entry.cost < plan.chi2 || !plan.chi2.is_finite() {
                plan.best = entry.best;
                plan.chi2 = entry.cost;
                plan.warning = entry.warning;
            } else {
                // A discarded result takes its warning with it.
                debug!(
                    cluster = plan.index,
                    cost = entry.cost,
                    retained = plan.chi2,
                    "Refinement did not improve on the grid point."
                );
                ctx.reporter.message(|| {
                    format!(
                        "cluster {}: refinement did not improve on the grid point",
                        plan.index
                    )
                });
            }
        }
    }
    ctx.reporter.report(Progress::PhaseFinish);

    ctx.reporter.report(Progress::PhaseStart { name: "disassembly" });
    for plan in &plans {
        vector::disassemble(dataset, &plan.cluster, model, &plan.layout, &plan.best);
    }
    ctx.reporter.report(Progress::PhaseFinish);

    if let Some(mc_settings) = &config.monte_carlo {
        ctx.reporter.report(Progress::PhaseStart { name: "monte carlo" });
        ctx.reporter.report(Progress::TaskStart {
            total_steps: plans.len() as u64,
        });
        for plan in &mut plans {
            let outcome = monte_carlo::run(
                dataset,
                &plan.cluster,
                model,
                &plan.layout,
                &plan.snapshot,
                ctx.physics,
                &plan.best,
                mc_settings,
                &simplex_settings(config),
                plan.scaling.as_ref(),
                plan.filter.as_ref(),
            )?;
            if outcome.eliminated > 0 {
                ctx.reporter.message(|| {
                    format!(
                        "cluster {}: {} of {} repetitions eliminated",
                        plan.index, outcome.eliminated, mc_settings.simulations
                    )
                });
            }
            plan.monte_carlo = Some(MonteCarloSummary {
                kept: outcome.kept,
                eliminated: outcome.eliminated,
            });
            ctx.reporter.report(Progress::TaskIncrement);
        }
        ctx.reporter.report(Progress::TaskFinish);
        ctx.reporter.report(Progress::PhaseFinish);
    }

    let clusters: Vec<ClusterFit> = plans
        .into_iter()
        .map(|plan| ClusterFit {
            cluster_index: plan.index,
            spins: plan.snapshot.spins.iter().map(|s| s.name.clone()).collect(),
            layout: plan.layout,
            values: plan.best,
            chi2: plan.chi2,
            iterations: plan.iterations,
            evaluations: plan.evaluations,
            warning: plan.warning,
            note: plan.note,
            monte_carlo: plan.monte_carlo,
        })
        .collect();
    info!(model = model.id, clusters = clusters.len(), "Fit finished.");
    Ok(FitReport {
        model: model.id,
        clusters,
    })
}
