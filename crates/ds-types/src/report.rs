//! Outcome records: the two report shapes a trial can emit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::ParameterMap;
use crate::errors::ReportError;

/// Key a completed trial's value is stored under.
pub const OUTPUT_KEY: &str = "experiment_output";

/// Key whose presence asks the stopping policy to end the trial.
pub const TERMINATED_KEY: &str = "terminated";

/// Unique trial identifier.
pub type TrialId = Uuid;

/// What a single trial reports. Exactly one shape per report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// The work unit finished in time. `None` when it failed internally.
    Output(Option<f64>),
    /// The deadline elapsed first.
    Terminated,
}

impl Outcome {
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Output(v) => *v,
            Self::Terminated => None,
        }
    }

    /// Render into the flat metrics map the results store keeps.
    pub fn to_metrics(&self) -> Map<String, Value> {
        let mut metrics = Map::new();
        match self {
            Self::Output(value) => {
                let json = value
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null);
                metrics.insert(OUTPUT_KEY.to_string(), json);
            }
            Self::Terminated => {
                metrics.insert(TERMINATED_KEY.to_string(), Value::Bool(true));
            }
        }
        metrics
    }

    /// Decode a metrics map. Both keys or neither key is an error.
    pub fn from_metrics(metrics: &Map<String, Value>) -> Result<Self, ReportError> {
        match (metrics.get(OUTPUT_KEY), metrics.get(TERMINATED_KEY)) {
            (Some(_), Some(_)) => Err(ReportError::BothPresent {
                output: OUTPUT_KEY,
                terminated: TERMINATED_KEY,
            }),
            (None, None) => Err(ReportError::NeitherPresent {
                output: OUTPUT_KEY,
                terminated: TERMINATED_KEY,
            }),
            (Some(Value::Null), None) => Ok(Self::Output(None)),
            (Some(Value::Number(n)), None) => Ok(Self::Output(n.as_f64())),
            (Some(other), None) => Err(ReportError::BadValue {
                key: OUTPUT_KEY,
                value: other.to_string(),
            }),
            (None, Some(Value::Bool(true))) => Ok(Self::Terminated),
            (None, Some(other)) => Err(ReportError::BadValue {
                key: TERMINATED_KEY,
                value: other.to_string(),
            }),
        }
    }
}

/// One report as the results store sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: TrialId,
    pub trial_number: usize,
    /// 1-based report counter for this trial.
    pub iteration: u64,
    pub timestamp: DateTime<Utc>,
    pub config: ParameterMap,
    pub metrics: Map<String, Value>,
}

impl TrialResult {
    pub fn new(
        trial_id: TrialId,
        trial_number: usize,
        iteration: u64,
        config: ParameterMap,
        outcome: Outcome,
    ) -> Self {
        Self {
            trial_id,
            trial_number,
            iteration,
            timestamp: Utc::now(),
            config,
            metrics: outcome.to_metrics(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.metrics.contains_key(key)
    }

    pub fn outcome(&self) -> Result<Outcome, ReportError> {
        Outcome::from_metrics(&self.metrics)
    }
}
