//! Shared state threaded through one fit invocation.

use super::config::FitConfig;
use super::objective::DispersionModel;
use super::progress::ProgressReporter;

/// Everything the fit phases share: the validated configuration, the
/// external physics implementation and the progress sink.
pub(crate) struct FitContext<'a, M: DispersionModel + ?Sized> {
    pub config: &'a FitConfig,
    pub physics: &'a M,
    pub reporter: &'a ProgressReporter<'a>,
}

impl<'a, M: DispersionModel + ?Sized> FitContext<'a, M> {
    pub fn new(
        config: &'a FitConfig,
        physics: &'a M,
        reporter: &'a ProgressReporter<'a>,
    ) -> Self {
        Self {
            config,
            physics,
            reporter,
        }
    }
}
