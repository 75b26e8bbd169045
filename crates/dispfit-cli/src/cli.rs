use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "dispfit developers",
    version,
    about = "dispfit CLI - Clustered fitting of relaxation-dispersion models: grid search, simplex refinement and Monte Carlo error estimation.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fit a dispersion model to a clustered measurement table.
    Fit(FitArgs),
    /// List the available dispersion models and their free parameters.
    Models,
}

/// Arguments for the `fit` subcommand.
#[derive(Args, Debug)]
pub struct FitArgs {
    // --- Core Arguments ---
    /// Path to the input measurement table (CSV: spin,cluster,key,x,y,error).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Identifier of the dispersion model to fit (see `dispfit models`).
    #[arg(short, long, required = true, value_name = "MODEL")]
    pub model: String,

    /// Fit this simpler model first and seed the target model's starting
    /// point from it through the nesting translations.
    #[arg(long, value_name = "MODEL")]
    pub source: Option<String>,

    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the fitted parameter table to this path as CSV.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    // --- Grid Overrides ---
    /// Override the number of grid increments per free parameter.
    #[arg(long, value_name = "INT")]
    pub increments: Option<usize>,

    /// Override the number of grid shards dispatched per cluster.
    #[arg(long, value_name = "INT")]
    pub shards: Option<usize>,

    // --- Minimiser Overrides ---
    /// Override the maximum number of simplex iterations.
    #[arg(long, value_name = "INT")]
    pub max_iterations: Option<usize>,

    /// Override the simplex convergence tolerance.
    #[arg(long, value_name = "FLOAT")]
    pub tolerance: Option<f64>,

    /// Disable the linear parameter constraints, overriding the config file.
    #[arg(long)]
    pub no_constraints: bool,

    /// Disable parameter scaling, overriding the config file.
    #[arg(long)]
    pub no_scaling: bool,

    // --- Monte Carlo Overrides ---
    /// Override the number of Monte Carlo repetitions (0 disables the loop).
    #[arg(long, value_name = "INT")]
    pub monte_carlo: Option<usize>,

    /// Override the Monte Carlo base seed.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,
}
