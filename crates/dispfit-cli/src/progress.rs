//! Terminal rendering of engine progress events.

use std::time::Duration;

use dispfit::engine::progress::{Progress, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Draws engine progress on stderr: a spinner while a phase runs, a counted
/// bar once the phase dispatches a job batch, and indented passthrough lines
/// for engine remarks. `ProgressBar` clones share one drawing state, so the
/// callback is handed a plain clone of the bar.
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
        bar.set_style(phase_style());
        Self { bar }
    }

    pub fn callback(&self) -> ProgressCallback<'static> {
        let bar = self.bar.clone();
        Box::new(move |event| render(&bar, event))
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn render(bar: &ProgressBar, event: Progress) {
    match event {
        Progress::PhaseStart { name } => {
            // Reset revives the bar a previous phase finished.
            bar.reset();
            bar.set_length(0);
            bar.set_style(phase_style());
            bar.set_message(name);
            bar.enable_steady_tick(TICK_INTERVAL);
        }
        Progress::PhaseFinish => {
            bar.disable_steady_tick();
            let phase = bar.message();
            bar.finish_with_message(format!("✓ {phase}"));
        }
        Progress::TaskStart { total_steps } => {
            bar.disable_steady_tick();
            bar.set_length(total_steps);
            bar.set_position(0);
            bar.set_style(batch_style());
        }
        Progress::TaskIncrement => bar.inc(1),
        Progress::TaskFinish => {
            if let Some(length) = bar.length() {
                bar.set_position(length);
            }
        }
        Progress::Message(text) => bar.println(format!("  {text}")),
    }
}

fn phase_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn batch_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg} {bar:30.cyan/blue} {pos}/{len} jobs")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}
