//! Trial and experiment configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::{SweepResult, TrialError};
use crate::validation_error;

pub const INPUT_ARG1_KEY: &str = "input_arg1";
pub const INPUT_ARG2_KEY: &str = "input_arg2";
pub const TIMEOUT_KEY: &str = "timeout";

/// A concrete parameter value produced by a search strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl ParameterValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Json(v) => v.as_f64(),
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

/// Ordered parameter mapping, one per trial.
pub type ParameterMap = BTreeMap<String, ParameterValue>;

/// Typed view of the configuration a single trial runs with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialConfig {
    pub input_arg1: f64,
    pub input_arg2: f64,
    pub timeout: Duration,
}

impl TrialConfig {
    pub fn new(input_arg1: f64, input_arg2: f64, timeout: Duration) -> Self {
        Self {
            input_arg1,
            input_arg2,
            timeout,
        }
    }

    /// Parse a trial configuration out of a merged parameter map.
    ///
    /// Missing keys, non-numeric values and negative timeouts are rejected.
    /// Extra keys are ignored.
    pub fn from_params(params: &ParameterMap) -> Result<Self, TrialError> {
        let input_arg1 = numeric(params, INPUT_ARG1_KEY)?;
        let input_arg2 = numeric(params, INPUT_ARG2_KEY)?;
        let seconds = numeric(params, TIMEOUT_KEY)?;
        let timeout = Duration::try_from_secs_f64(seconds)
            .map_err(|_| TrialError::InvalidTimeout { seconds })?;

        Ok(Self {
            input_arg1,
            input_arg2,
            timeout,
        })
    }

    /// Inverse of [`TrialConfig::from_params`].
    pub fn to_params(&self) -> ParameterMap {
        let mut params = ParameterMap::new();
        params.insert(INPUT_ARG1_KEY.into(), ParameterValue::Float(self.input_arg1));
        params.insert(INPUT_ARG2_KEY.into(), ParameterValue::Float(self.input_arg2));
        params.insert(
            TIMEOUT_KEY.into(),
            ParameterValue::Float(self.timeout.as_secs_f64()),
        );
        params
    }
}

fn numeric(params: &ParameterMap, key: &str) -> Result<f64, TrialError> {
    let value = params.get(key).ok_or_else(|| TrialError::MissingKey {
        key: key.to_string(),
    })?;
    value.as_f64().ok_or_else(|| TrialError::NotNumeric {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Unique experiment identifier.
pub type ExperimentId = Uuid;

/// Top-level configuration for a sweep run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub id: ExperimentId,

    /// Experiment name; results land in `<log_dir>/<name>/`.
    pub name: String,

    pub log_dir: PathBuf,

    /// Base seed. Each trial draws from its own ChaCha stream of this seed.
    pub seed: u64,

    /// Per-trial deadline in seconds.
    pub timeout_secs: u64,

    /// How many trials to run in parallel.
    pub max_concurrent_trials: usize,

    /// Upper bound (inclusive) on the number of sleep steps a simulated work
    /// unit draws.
    pub max_sleep_steps: u32,

    /// Length of one simulated sleep step.
    pub sleep_step: Duration,

    /// Random points drawn after the fixed points are exhausted.
    pub num_samples: usize,

    pub created_at: DateTime<Utc>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self::new("sample_experiment")
    }
}

impl ExperimentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            log_dir: PathBuf::from("/tmp"),
            seed: 42,
            timeout_secs: 10,
            max_concurrent_trials: 4,
            max_sleep_steps: 20,
            sleep_step: Duration::from_secs(1),
            num_samples: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.max_concurrent_trials = n;
        self
    }

    pub fn with_sleep(mut self, max_steps: u32, step: Duration) -> Self {
        self.max_sleep_steps = max_steps;
        self.sleep_step = step;
        self
    }

    pub fn with_num_samples(mut self, n: usize) -> Self {
        self.num_samples = n;
        self
    }

    /// Directory this experiment writes into.
    pub fn experiment_dir(&self) -> PathBuf {
        self.log_dir.join(&self.name)
    }

    /// Base config every search point is merged into.
    pub fn base_params(&self) -> ParameterMap {
        let mut params = ParameterMap::new();
        let timeout = i64::try_from(self.timeout_secs)
            .map(ParameterValue::Int)
            .unwrap_or(ParameterValue::Float(self.timeout_secs as f64));
        params.insert(TIMEOUT_KEY.into(), timeout);
        params
    }

    pub fn validate(&self) -> SweepResult<()> {
        if self.name.trim().is_empty() {
            return Err(validation_error!("experiment name must not be empty"));
        }
        if self.name.contains(std::path::is_separator) {
            return Err(validation_error!(
                "experiment name {:?} must not contain a path separator",
                self.name
            ));
        }
        if i64::try_from(self.timeout_secs).is_err() {
            return Err(validation_error!(
                "timeout of {} seconds is out of range (max {})",
                self.timeout_secs,
                i64::MAX
            ));
        }
        if self.max_concurrent_trials == 0 {
            return Err(validation_error!("max_concurrent_trials must be at least 1"));
        }
        Ok(())
    }
}
