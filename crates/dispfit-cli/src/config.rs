//! Layered fit configuration: built-in defaults, then the TOML config
//! file, then CLI argument overrides, validated by the core builder.

use crate::cli::FitArgs;
use crate::error::{CliError, Result};
use dispfit::core::registry::ExperimentFamily;
use dispfit::engine::config::{Algorithm, ConstraintMethod, FitConfig, FitConfigBuilder, MonteCarloSettings};
use dispfit::engine::error::EngineError;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

const DEFAULT_INCREMENTS: usize = 21;
const DEFAULT_MAX_ITERATIONS: usize = 10_000;
const DEFAULT_TOLERANCE: f64 = 1e-10;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PartialFitConfig {
    #[serde(default)]
    pub grid: GridSection,
    #[serde(default)]
    pub minimiser: MinimiserSection,
    pub monte_carlo: Option<MonteCarloSection>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct GridSection {
    pub increments: Option<usize>,
    pub shards: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct MinimiserSection {
    pub algorithm: Option<String>,
    pub max_iterations: Option<usize>,
    pub tolerance: Option<f64>,
    pub constraints: Option<bool>,
    pub constraint_method: Option<String>,
    pub scaling: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct MonteCarloSection {
    pub simulations: Option<usize>,
    pub seed: Option<u64>,
}

impl PartialFitConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        debug!("Loaded configuration file: {:?}", config);
        Ok(config)
    }

    /// Resolve the final configuration: CLI overrides beat the file, the
    /// file beats the defaults.
    pub fn merge_with_cli(&self, args: &FitArgs, family: ExperimentFamily) -> Result<FitConfig> {
        let algorithm_name = self.minimiser.algorithm.as_deref().unwrap_or("simplex");
        let algorithm = Algorithm::from_name(algorithm_name, family).map_err(EngineError::from)?;
        let constraint_method = match self.minimiser.constraint_method.as_deref() {
            Some(name) => ConstraintMethod::from_name(name).map_err(EngineError::from)?,
            None => ConstraintMethod::default(),
        };

        let mut builder = FitConfigBuilder::new()
            .increments(
                args.increments
                    .or(self.grid.increments)
                    .unwrap_or(DEFAULT_INCREMENTS),
            )
            .shards(args.shards.or(self.grid.shards).unwrap_or(1))
            .algorithm(algorithm)
            .max_iterations(
                args.max_iterations
                    .or(self.minimiser.max_iterations)
                    .unwrap_or(DEFAULT_MAX_ITERATIONS),
            )
            .tolerance(
                args.tolerance
                    .or(self.minimiser.tolerance)
                    .unwrap_or(DEFAULT_TOLERANCE),
            )
            .constraints(!args.no_constraints && self.minimiser.constraints.unwrap_or(true))
            .scaling(!args.no_scaling && self.minimiser.scaling.unwrap_or(true))
            .constraint_method(constraint_method);

        let simulations = args
            .monte_carlo
            .or_else(|| self.monte_carlo.as_ref().and_then(|m| m.simulations));
        if let Some(simulations) = simulations {
            if simulations > 0 {
                let seed = args
                    .seed
                    .or_else(|| self.monte_carlo.as_ref().and_then(|m| m.seed))
                    .unwrap_or(0);
                builder = builder.monte_carlo(MonteCarloSettings { simulations, seed });
            }
        }

        let config = builder.build().map_err(EngineError::from)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_args() -> FitArgs {
        FitArgs {
            input: "data.csv".into(),
            model: "CR72".to_string(),
            source: None,
            config: None,
            output: None,
            increments: None,
            shards: None,
            max_iterations: None,
            tolerance: None,
            no_constraints: false,
            no_scaling: false,
            monte_carlo: None,
            seed: None,
        }
    }

    #[test]
    fn defaults_produce_a_valid_configuration() {
        let config = PartialFitConfig::default()
            .merge_with_cli(&bare_args(), ExperimentFamily::Cpmg)
            .unwrap();
        assert_eq!(config.grid.increments, DEFAULT_INCREMENTS);
        assert_eq!(config.grid.shards, 1);
        assert!(config.minimiser.constraints);
        assert!(config.monte_carlo.is_none());
    }

    #[test]
    fn file_values_are_parsed_and_cli_overrides_win() {
        let partial: PartialFitConfig = toml::from_str(
            "[grid]\n\
             increments = 11\n\
             shards = 4\n\
             [minimiser]\n\
             tolerance = 1e-12\n\
             [monte-carlo]\n\
             simulations = 500\n\
             seed = 9\n",
        )
        .unwrap();

        let mut args = bare_args();
        args.increments = Some(7);
        args.monte_carlo = Some(100);
        let config = partial.merge_with_cli(&args, ExperimentFamily::Cpmg).unwrap();

        assert_eq!(config.grid.increments, 7);
        assert_eq!(config.grid.shards, 4);
        assert_eq!(config.minimiser.tolerance, 1e-12);
        let mc = config.monte_carlo.unwrap();
        assert_eq!(mc.simulations, 100);
        assert_eq!(mc.seed, 9);
    }

    #[test]
    fn zero_monte_carlo_repetitions_disable_the_loop() {
        let mut args = bare_args();
        args.monte_carlo = Some(0);
        let config = PartialFitConfig::default()
            .merge_with_cli(&args, ExperimentFamily::Cpmg)
            .unwrap();
        assert!(config.monte_carlo.is_none());
    }

    #[test]
    fn from_file_reads_and_reports_parse_failures_with_the_path() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("fit.toml");

        std::fs::write(&path, "[grid]\nincrements = 31\n").unwrap();
        let partial = PartialFitConfig::from_file(&path).unwrap();
        assert_eq!(partial.grid.increments, Some(31));

        std::fs::write(&path, "[grid\nincrements = 31\n").unwrap();
        let err = PartialFitConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("fit.toml"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: std::result::Result<PartialFitConfig, _> =
            toml::from_str("[grid]\nstep-count = 5\n");
        assert!(result.is_err());
    }

    #[test]
    fn invalid_algorithm_from_file_is_a_config_error() {
        let partial: PartialFitConfig =
            toml::from_str("[minimiser]\nalgorithm = \"bfgs\"\n").unwrap();
        assert!(partial.merge_with_cli(&bare_args(), ExperimentFamily::Cpmg).is_err());
    }
}
