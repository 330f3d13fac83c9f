//! Result reporting: turns an execution into exactly one outcome record.

use ds_types::{Outcome, ParameterMap, SweepResult, TrialId, TrialResult};

use crate::executor::Execution;

/// Destination for trial reports (the results store).
pub trait ReportSink: Send + Sync {
    fn record(&self, result: TrialResult) -> SweepResult<()>;
}

/// Single-use reporter for one trial invocation.
///
/// Every emitting method consumes the reporter, so a trial cannot report twice.
pub struct Reporter<'a> {
    sink: &'a dyn ReportSink,
    trial_id: TrialId,
    trial_number: usize,
    iteration: u64,
    config: ParameterMap,
}

impl<'a> Reporter<'a> {
    pub fn new(
        sink: &'a dyn ReportSink,
        trial_id: TrialId,
        trial_number: usize,
        config: ParameterMap,
    ) -> Self {
        Self {
            sink,
            trial_id,
            trial_number,
            iteration: 1,
            config,
        }
    }

    /// Report a completed trial's value (`None` for an internal failure).
    pub fn report_output(self, value: Option<f64>) -> SweepResult<TrialResult> {
        self.emit(Outcome::Output(value))
    }

    /// Ask the stopping policy to end this trial.
    pub fn request_termination(self) -> SweepResult<TrialResult> {
        self.emit(Outcome::Terminated)
    }

    pub fn report_execution(self, execution: &Execution) -> SweepResult<TrialResult> {
        match execution {
            Execution::Completed { value, .. } => self.report_output(*value),
            Execution::TimedOut { .. } => self.request_termination(),
        }
    }

    fn emit(self, outcome: Outcome) -> SweepResult<TrialResult> {
        let result = TrialResult::new(
            self.trial_id,
            self.trial_number,
            self.iteration,
            self.config,
            outcome,
        );
        self.sink.record(result.clone())?;
        Ok(result)
    }
}
