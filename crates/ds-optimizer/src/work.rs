//! Work units: the variable-duration computation a trial runs.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, error, info};

use ds_types::{TrialConfig, WorkError};

/// A unit of work evaluated once per trial.
///
/// Implementations may block for as long as they like; the executor runs them
/// on a dedicated thread. Randomness comes only from the `rng` passed in.
pub trait WorkUnit: Send + Sync + 'static {
    fn run(&self, config: &TrialConfig, rng: &mut ChaCha8Rng) -> Result<f64, WorkError>;
}

/// Run `work`, absorbing errors and panics into an absent outcome.
///
/// Never returns an error, and only lets a panic through when the panic
/// payload itself panics on drop.
pub fn evaluate<W: WorkUnit + ?Sized>(
    work: &W,
    config: &TrialConfig,
    rng: &mut ChaCha8Rng,
) -> Option<f64> {
    match panic::catch_unwind(AssertUnwindSafe(|| work.run(config, rng))) {
        Ok(Ok(value)) => {
            debug!(outcome = value, "work unit finished");
            Some(value)
        }
        Ok(Err(e)) => {
            error!(error = %e, "ERROR in worker thread");
            None
        }
        Err(payload) => {
            let e = WorkError::Panicked {
                message: panic_message(payload.as_ref()),
            };
            error!(error = %e, "ERROR in worker thread");
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Per-trial random stream: the experiment seed, on stream `trial_number`.
pub fn trial_rng(seed: u64, trial_number: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(trial_number as u64);
    rng
}

/// What a simulated work unit will compute and how long it will sleep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkPlan {
    pub value: f64,
    pub delay: Duration,
}

/// Stand-in for real work: `U[0,1) * input_arg1 + input_arg2`, then a sleep
/// of `randint(0, max_steps)` steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedWork {
    pub max_steps: u32,
    pub step: Duration,
}

impl Default for SimulatedWork {
    fn default() -> Self {
        Self {
            max_steps: 20,
            step: Duration::from_secs(1),
        }
    }
}

impl SimulatedWork {
    pub fn new(max_steps: u32, step: Duration) -> Self {
        Self { max_steps, step }
    }

    /// Draw the value and delay from `rng` without sleeping.
    pub fn plan(&self, config: &TrialConfig, rng: &mut ChaCha8Rng) -> WorkPlan {
        let value = rng.random::<f64>() * config.input_arg1 + config.input_arg2;
        let steps = rng.random_range(0..=self.max_steps);
        WorkPlan {
            value,
            delay: self.step.saturating_mul(steps),
        }
    }
}

impl WorkUnit for SimulatedWork {
    fn run(&self, config: &TrialConfig, rng: &mut ChaCha8Rng) -> Result<f64, WorkError> {
        let plan = self.plan(config, rng);
        if !plan.value.is_finite() {
            return Err(WorkError::Computation {
                message: format!("non-finite outcome {}", plan.value),
            });
        }
        info!(outcomes = plan.value, "computed outcome");
        info!(sleep_ms = plan.delay.as_millis() as u64, "going to sleep");
        std::thread::sleep(plan.delay);
        Ok(plan.value)
    }
}
