//! Progress events emitted while a fit runs.
//!
//! The workflow announces each phase (validation, nesting, grid search,
//! refinement, disassembly, monte carlo) and, within the dispatched phases,
//! counts finished jobs so a front end can render a bar. Remarks that a user
//! should see without raising the log level (discarded refinements,
//! eliminated repetitions) travel as [`Progress::Message`]. The engine
//! itself never prints; a fit without a callback reports into the void.

#[derive(Debug, Clone)]
pub enum Progress {
    /// A named fit phase has begun.
    PhaseStart { name: &'static str },
    PhaseFinish,

    /// The current phase dispatched a counted batch of jobs (grid streams,
    /// shards, refinements or Monte Carlo clusters).
    TaskStart { total_steps: u64 },
    /// One job of the current batch finished.
    TaskIncrement,
    TaskFinish,

    /// A user-visible remark about the current phase.
    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    /// A reporter that discards every event.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    /// Emit a [`Progress::Message`], formatting it only when a callback is
    /// installed.
    pub fn message(&self, text: impl FnOnce() -> String) {
        if let Some(cb) = &self.callback {
            cb(Progress::Message(text()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn events_reach_the_installed_callback_in_order() {
        let seen: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            let tag = match event {
                Progress::PhaseStart { name } => format!("start:{name}"),
                Progress::PhaseFinish => "finish".to_string(),
                Progress::TaskStart { total_steps } => format!("tasks:{total_steps}"),
                Progress::TaskIncrement => "inc".to_string(),
                Progress::TaskFinish => "tasks-done".to_string(),
                Progress::Message(text) => format!("msg:{text}"),
            };
            seen.lock().unwrap().push(tag);
        }));

        reporter.report(Progress::PhaseStart { name: "grid search" });
        reporter.report(Progress::TaskStart { total_steps: 2 });
        reporter.report(Progress::TaskIncrement);
        reporter.message(|| "cluster 0: shard discarded".to_string());
        reporter.report(Progress::PhaseFinish);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "start:grid search",
                "tasks:2",
                "inc",
                "msg:cluster 0: shard discarded",
                "finish",
            ]
        );
    }

    #[test]
    fn a_silent_reporter_never_formats_messages() {
        let reporter = ProgressReporter::new();
        reporter.message(|| panic!("formatted without a callback"));
        reporter.report(Progress::PhaseFinish);
    }
}
