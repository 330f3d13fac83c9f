//! Stopping policies consulted after every report.

use ds_types::{TrialId, TrialResult, TERMINATED_KEY};

/// Decides, per trial, whether the latest report ends the trial.
pub trait Stopper: Send + Sync {
    fn should_stop(&self, trial_id: TrialId, latest: &TrialResult) -> bool;

    /// Whether the whole experiment should stop scheduling new trials.
    fn stop_all(&self) -> bool {
        false
    }
}

/// Stops a trial exactly when its latest report carries the `terminated` key.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminationStopper;

impl Stopper for TerminationStopper {
    fn should_stop(&self, _trial_id: TrialId, latest: &TrialResult) -> bool {
        latest.contains(TERMINATED_KEY)
    }
}
