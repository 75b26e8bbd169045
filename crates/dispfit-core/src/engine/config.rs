use thiserror::Error;

use crate::core::registry::ExperimentFamily;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid minimization algorithm '{name}' for {family:?} models")]
    UnknownAlgorithm {
        name: String,
        family: ExperimentFamily,
    },

    #[error("Unsupported bound-constraint method '{0}' (only 'penalty' is available)")]
    UnsupportedConstraintMethod(String),

    #[error("Grid increments must be at least 2, got {0}")]
    TooFewIncrements(usize),
}

/// Minimization algorithm. Dispersion model families expose no analytic
/// gradients, so the simplex is the only valid choice; the name check exists
/// to reject configurations written for gradient-capable fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Simplex,
}

impl Algorithm {
    pub fn from_name(name: &str, family: ExperimentFamily) -> Result<Self, ConfigError> {
        match name {
            "simplex" => Ok(Algorithm::Simplex),
            _ => Err(ConfigError::UnknownAlgorithm {
                name: name.to_string(),
                family,
            }),
        }
    }
}

/// How linear constraints are enforced during simplex refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstraintMethod {
    /// Violating points are assigned the sentinel cost.
    #[default]
    Penalty,
}

impl ConstraintMethod {
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "penalty" => Ok(ConstraintMethod::Penalty),
            _ => Err(ConfigError::UnsupportedConstraintMethod(name.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridSettings {
    /// Increments per grid dimension (inclusive of both bounds).
    pub increments: usize,
    /// Number of contiguous shards the filtered point set is split into for
    /// parallel dispatch.
    pub shards: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinimiserSettings {
    pub algorithm: Algorithm,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub constraints: bool,
    pub constraint_method: ConstraintMethod,
    pub scaling: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonteCarloSettings {
    pub simulations: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    pub grid: GridSettings,
    pub minimiser: MinimiserSettings,
    pub monte_carlo: Option<MonteCarloSettings>,
}

#[derive(Default)]
pub struct FitConfigBuilder {
    increments: Option<usize>,
    shards: Option<usize>,
    algorithm: Option<Algorithm>,
    max_iterations: Option<usize>,
    tolerance: Option<f64>,
    constraints: Option<bool>,
    constraint_method: Option<ConstraintMethod>,
    scaling: Option<bool>,
    monte_carlo: Option<MonteCarloSettings>,
}

impl FitConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increments(mut self, n: usize) -> Self {
        self.increments = Some(n);
        self
    }
    pub fn shards(mut self, n: usize) -> Self {
        self.shards = Some(n);
        self
    }
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }
    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }
    pub fn constraints(mut self, enabled: bool) -> Self {
        self.constraints = Some(enabled);
        self
    }
    pub fn constraint_method(mut self, method: ConstraintMethod) -> Self {
        self.constraint_method = Some(method);
        self
    }
    pub fn scaling(mut self, enabled: bool) -> Self {
        self.scaling = Some(enabled);
        self
    }
    pub fn monte_carlo(mut self, settings: MonteCarloSettings) -> Self {
        self.monte_carlo = Some(settings);
        self
    }

    pub fn build(self) -> Result<FitConfig, ConfigError> {
        let increments = self
            .increments
            .ok_or(ConfigError::MissingParameter("increments"))?;
        if increments < 2 {
            return Err(ConfigError::TooFewIncrements(increments));
        }
        Ok(FitConfig {
            grid: GridSettings {
                increments,
                shards: self.shards.unwrap_or(1),
            },
            minimiser: MinimiserSettings {
                algorithm: self
                    .algorithm
                    .ok_or(ConfigError::MissingParameter("algorithm"))?,
                max_iterations: self
                    .max_iterations
                    .ok_or(ConfigError::MissingParameter("max_iterations"))?,
                tolerance: self
                    .tolerance
                    .ok_or(ConfigError::MissingParameter("tolerance"))?,
                constraints: self.constraints.unwrap_or(true),
                constraint_method: self.constraint_method.unwrap_or_default(),
                scaling: self.scaling.unwrap_or(true),
            },
            monte_carlo: self.monte_carlo,
        })
    }
}
