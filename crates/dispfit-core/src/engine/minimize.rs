//! Nelder-Mead simplex refinement.
//!
//! The downhill simplex is the only minimizer the engine carries: dispersion
//! lineshapes expose no analytic gradients, and constraint handling is done
//! through the objective's penalty sentinel rather than inside the step
//! logic. Coordinates are whatever the objective expects (scaled when a
//! scaling matrix is active).

use nalgebra::DVector;
use tracing::{debug, instrument};

use super::objective::CostFunction;

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Relative perturbation applied to nonzero start coordinates when building
/// the initial simplex.
const DELTA_NONZERO: f64 = 0.05;
/// Absolute perturbation for coordinates starting at exactly zero.
const DELTA_ZERO: f64 = 0.000_25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplexSettings {
    pub max_iterations: usize,
    /// Convergence threshold on both the cost spread and the coordinate
    /// spread across the simplex.
    pub tolerance: f64,
}

#[derive(Debug, Clone)]
pub struct MinimizeOutcome {
    pub x: DVector<f64>,
    pub cost: f64,
    pub iterations: usize,
    pub evaluations: u64,
    /// Set when the iteration budget ran out before convergence.
    pub warning: Option<String>,
}

struct Vertex {
    x: DVector<f64>,
    cost: f64,
}

fn initial_simplex<C: CostFunction + ?Sized>(
    objective: &C,
    start: DVector<f64>,
    evaluations: &mut u64,
) -> Vec<Vertex> {
    let n = start.len();
    let mut simplex = Vec::with_capacity(n + 1);
    let cost = objective.eval(&start);
    *evaluations += 1;
    simplex.push(Vertex { x: start, cost });

    for i in 0..n {
        let mut x = simplex[0].x.clone();
        if x[i] != 0.0 {
            x[i] *= 1.0 + DELTA_NONZERO;
        } else {
            x[i] = DELTA_ZERO;
        }
        let cost = objective.eval(&x);
        *evaluations += 1;
        simplex.push(Vertex { x, cost });
    }
    simplex
}

fn converged(simplex: &[Vertex], tolerance: f64) -> bool {
    let best = &simplex[0];
    let worst = &simplex[simplex.len() - 1];
    if (worst.cost - best.cost).abs() > tolerance {
        return false;
    }
    simplex[1..].iter().all(|v| {
        v.x.iter()
            .zip(best.x.iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    })
}

/// Minimize `objective` from `start`. A zero-length start vector means the
/// cluster has no free parameters; the objective is evaluated once and
/// returned untouched.
#[instrument(skip_all, name = "simplex", fields(dims = start.len()))]
pub fn nelder_mead<C: CostFunction + ?Sized>(
    objective: &C,
    start: DVector<f64>,
    settings: &SimplexSettings,
) -> MinimizeOutcome {
    let n = start.len();
    if n == 0 {
        let cost = objective.eval(&start);
        return MinimizeOutcome {
            x: start,
            cost,
            iterations: 0,
            evaluations: 1,
            warning: None,
        };
    }

    let mut evaluations = 0u64;
    let mut simplex = initial_simplex(objective, start, &mut evaluations);
    let mut iterations = 0;

    while iterations < settings.max_iterations {
        simplex.sort_by(|a, b| {
            a.cost
                .partial_cmp(&b.cost)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if converged(&simplex, settings.tolerance) {
            break;
        }
        iterations += 1;

        let worst = simplex.len() - 1;
        let mut centroid = DVector::zeros(n);
        for vertex in &simplex[..worst] {
            centroid += &vertex.x;
        }
        centroid /= worst as f64;

        let reflected = &centroid + (&centroid - &simplex[worst].x) * REFLECT;
        let reflected_cost = objective.eval(&reflected);
        evaluations += 1;

        if reflected_cost < simplex[0].cost {
            let expanded = &centroid + (&reflected - &centroid) * EXPAND;
            let expanded_cost = objective.eval(&expanded);
            evaluations += 1;
            if expanded_cost < reflected_cost {
                simplex[worst] = Vertex {
                    x: expanded,
                    cost: expanded_cost,
                };
            } else {
                simplex[worst] = Vertex {
                    x: reflected,
                    cost: reflected_cost,
                };
            }
            continue;
        }

        if reflected_cost < simplex[worst - 1].cost {
            simplex[worst] = Vertex {
                x: reflected,
                cost: reflected_cost,
            };
            continue;
        }

        let contracted = &centroid + (&simplex[worst].x - &centroid) * CONTRACT;
        let contracted_cost = objective.eval(&contracted);
        evaluations += 1;
        if contracted_cost < simplex[worst].cost {
            simplex[worst] = Vertex {
                x: contracted,
                cost: contracted_cost,
            };
            continue;
        }

        // Shrink everything toward the best vertex.
        let best = simplex[0].x.clone();
        for vertex in &mut simplex[1..] {
            vertex.x = &best + (&vertex.x - &best) * SHRINK;
            vertex.cost = objective.eval(&vertex.x);
            evaluations += 1;
        }
    }

    simplex.sort_by(|a, b| {
        a.cost
            .partial_cmp(&b.cost)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let warning = if iterations >= settings.max_iterations && !converged(&simplex, settings.tolerance)
    {
        Some(format!(
            "simplex exhausted {} iterations without converging",
            settings.max_iterations
        ))
    } else {
        None
    };
    debug!(iterations, evaluations, cost = simplex[0].cost, "Simplex finished.");

    let Vertex { x, cost } = simplex.swap_remove(0);
    MinimizeOutcome {
        x,
        cost,
        iterations,
        evaluations,
        warning,
    }
}
