use std::fs::File;
use std::path::Path;

use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

use crate::error::{CliError, Result};

/// Console verbosity ladder: `-q` silences everything, each `-v` raises the
/// level by one step starting from warnings.
fn console_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::OFF;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install the global subscriber: a compact stderr layer filtered by the
/// verbosity flags, plus an unabridged file layer when `log_file` is given.
/// Timestamps are left to the file layer; the console shares the terminal
/// with the progress bar and stays terse.
pub fn init(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact();

    let subscriber = tracing_subscriber::registry()
        .with(console_filter(verbosity, quiet))
        .with(stderr_layer);

    match log_file {
        Some(path) => {
            let file = File::create(path).map_err(CliError::Io)?;
            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_target(true);
            subscriber.with(file_layer).init();
        }
        None => subscriber.init(),
    }
    Ok(())
}
