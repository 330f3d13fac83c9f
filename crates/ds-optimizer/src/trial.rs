//! Trial tracking and experiment run summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ds_types::{ExperimentConfig, ExperimentId, ParameterMap, TrialId, TrialResult};

/// Lifecycle state for an experiment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperimentState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Aggregate view of an experiment run, returned by the trial runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentAnalysis {
    pub id: ExperimentId,
    pub config: ExperimentConfig,
    pub state: ExperimentState,
    pub trials: Vec<Trial>,
    pub trials_completed: usize,
    pub trials_terminated: usize,
    pub trials_failed: usize,
    /// Highest `experiment_output` among completed trials.
    pub best_trial: Option<TrialResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ExperimentAnalysis {
    pub fn new(config: ExperimentConfig) -> Self {
        Self {
            id: config.id,
            config,
            state: ExperimentState::Pending,
            trials: Vec::new(),
            trials_completed: 0,
            trials_terminated: 0,
            trials_failed: 0,
            best_trial: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = ExperimentState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = ExperimentState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = ExperimentState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Fold a finished trial into the counters and the best-trial slot.
    pub fn record_trial(&mut self, trial: Trial) {
        match trial.status {
            TrialStatus::Completed => self.trials_completed += 1,
            TrialStatus::Terminated => self.trials_terminated += 1,
            TrialStatus::Failed => self.trials_failed += 1,
            TrialStatus::Pending | TrialStatus::Running => {}
        }
        if trial.status == TrialStatus::Completed {
            if let Some(result) = &trial.result {
                self.update_best(result);
            }
        }
        self.trials.push(trial);
    }

    /// Update the best trial if `result` has a higher output. Results without
    /// an output never qualify.
    pub fn update_best(&mut self, result: &TrialResult) {
        let Some(candidate) = output_of(result) else {
            return;
        };
        let improves = match self.best_trial.as_ref().and_then(output_of) {
            None => true,
            Some(current) => candidate > current,
        };
        if improves {
            self.best_trial = Some(result.clone());
        }
    }

    pub fn trial(&self, trial_number: usize) -> Option<&Trial> {
        self.trials.iter().find(|t| t.trial_number == trial_number)
    }
}

fn output_of(result: &TrialResult) -> Option<f64> {
    result.outcome().ok().and_then(|o| o.value())
}

// ---------------------------------------------------------------------------
// Individual trial
// ---------------------------------------------------------------------------

/// A single trial (one parameter combination run under a deadline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: TrialId,
    pub experiment_id: ExperimentId,
    pub trial_number: usize,
    pub parameters: ParameterMap,
    pub status: TrialStatus,
    pub result: Option<TrialResult>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub error: Option<String>,
}

impl Trial {
    pub fn new(experiment_id: ExperimentId, trial_number: usize, parameters: ParameterMap) -> Self {
        Self {
            id: Uuid::new_v4(),
            experiment_id,
            trial_number,
            parameters,
            status: TrialStatus::Pending,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            worker_id: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self, worker_id: Option<String>) {
        self.status = TrialStatus::Running;
        self.started_at = Some(Utc::now());
        self.worker_id = worker_id;
    }

    pub fn mark_completed(&mut self, result: TrialResult) {
        self.finish(TrialStatus::Completed, result);
    }

    /// The stopping policy ended this trial.
    pub fn mark_terminated(&mut self, result: TrialResult) {
        self.finish(TrialStatus::Terminated, result);
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = TrialStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    fn finish(&mut self, status: TrialStatus, result: TrialResult) {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self.result = Some(result);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Pending,
    Running,
    Completed,
    Terminated,
    Failed,
}
