use thiserror::Error;

use super::config::ConfigError;
use crate::core::io::DatasetError;
use crate::core::models::params::Param;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Dataset error: {source}")]
    Dataset {
        #[from]
        source: DatasetError,
    },

    #[error("Unknown model identifier '{0}'")]
    UnknownModel(String),

    #[error(
        "Mismatched parameter sets within cluster {cluster}: spin '{spin}' declares model '{model}', expected '{expected}'"
    )]
    ParamSetMismatch {
        cluster: usize,
        spin: String,
        model: String,
        expected: String,
    },

    #[error("Grid of {points} points exceeds the hard ceiling of {ceiling}")]
    GridTooLarge { points: u128, ceiling: u128 },

    #[error(
        "Reciprocal copy of '{param}' during nesting would divide by zero (source model '{source_model}')"
    )]
    NestingZeroDivision { param: Param, source_model: String },

    #[error("Missing required value for parameter '{param}' on spin '{spin}'")]
    MissingValue { spin: String, param: Param },

    #[error("Starting point of cluster {cluster} violates constraint row {row}")]
    InfeasibleStart { cluster: usize, row: usize },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
