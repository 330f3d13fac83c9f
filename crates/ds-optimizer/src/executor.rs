//! Deadline-bounded execution of a work unit.
//!
//! The [`DeadlineExecutor`] starts the work unit on its own thread and waits on
//! a one-shot channel for at most the trial's timeout. A worker that misses the
//! deadline is abandoned, not cancelled: it keeps running in the background and
//! whatever it eventually produces is dropped with the channel. Nothing joins
//! it. Callers that need real cancellation must thread their own signal into
//! the work unit.

use crossbeam_channel::RecvTimeoutError;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use ds_types::{Outcome, TrialConfig, TrialError};

use crate::work::{self, WorkUnit};

/// Terminal state of an execution. While `execute` blocks the owning trial is
/// `TrialStatus::Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Completed,
    TimedOut,
}

/// Terminal classification of one execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Execution {
    /// The work unit returned before the deadline. `value` is `None` when it
    /// failed internally.
    Completed { value: Option<f64>, elapsed: Duration },
    /// The deadline elapsed while the work unit was still running.
    TimedOut { deadline: Duration },
}

impl Execution {
    pub fn state(&self) -> ExecutionState {
        match self {
            Self::Completed { .. } => ExecutionState::Completed,
            Self::TimedOut { .. } => ExecutionState::TimedOut,
        }
    }

    /// The report shape this execution maps to.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Completed { value, .. } => Outcome::Output(*value),
            Self::TimedOut { .. } => Outcome::Terminated,
        }
    }
}

pub struct DeadlineExecutor<W: ?Sized> {
    work: Arc<W>,
}

impl<W: WorkUnit + ?Sized> DeadlineExecutor<W> {
    pub fn new(work: Arc<W>) -> Self {
        Self { work }
    }

    /// Run the work unit under `config.timeout`.
    ///
    /// A zero timeout never observes completion: the worker is still spawned
    /// (and abandoned) but the trial is classified `TimedOut` straight away.
    /// Spawning the worker thread is the only failure path.
    pub fn execute(
        &self,
        trial_number: usize,
        config: &TrialConfig,
        mut rng: ChaCha8Rng,
    ) -> Result<Execution, TrialError> {
        let (tx, rx) = crossbeam_channel::bounded::<Option<f64>>(1);
        let work = Arc::clone(&self.work);
        let worker_config = *config;
        let deadline = config.timeout;

        let started = Instant::now();
        thread::Builder::new()
            .name(format!("trial-{trial_number}-work"))
            .spawn(move || {
                let value = work::evaluate(work.as_ref(), &worker_config, &mut rng);
                // The receiver is gone once the trial has timed out.
                if tx.send(value).is_err() {
                    debug!(trial_number, "abandoned worker finished; result discarded");
                }
            })
            .map_err(|e| TrialError::SpawnFailed {
                trial_number,
                message: e.to_string(),
            })?;

        if deadline.is_zero() {
            warn!(trial_number, "zero timeout; abandoning worker immediately");
            return Ok(Execution::TimedOut { deadline });
        }

        match rx.recv_timeout(deadline) {
            Ok(value) => Ok(Execution::Completed {
                value,
                elapsed: started.elapsed(),
            }),
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    trial_number,
                    timeout_ms = deadline.as_millis() as u64,
                    "worker still alive at deadline; abandoning it"
                );
                Ok(Execution::TimedOut { deadline })
            }
            // `evaluate` absorbs panics, so this only happens when unwinding
            // escapes it, e.g. a panic payload that panics on drop.
            Err(RecvTimeoutError::Disconnected) => {
                error!(trial_number, "worker exited without a result");
                Ok(Execution::Completed {
                    value: None,
                    elapsed: started.elapsed(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::trial_rng;
    use ds_types::WorkError;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Sleepy {
        delay: Duration,
        value: f64,
    }

    impl WorkUnit for Sleepy {
        fn run(&self, _: &TrialConfig, _: &mut ChaCha8Rng) -> Result<f64, WorkError> {
            thread::sleep(self.delay);
            Ok(self.value)
        }
    }

    fn run(delay_ms: u64, timeout_ms: u64) -> Execution {
        let executor = DeadlineExecutor::new(Arc::new(Sleepy {
            delay: Duration::from_millis(delay_ms),
            value: 4.0,
        }));
        let config = TrialConfig::new(0.0, 0.0, Duration::from_millis(timeout_ms));
        executor.execute(0, &config, trial_rng(0, 0)).unwrap()
    }

    #[test]
    fn completes_within_deadline() {
        let execution = run(10, 1_000);
        assert_eq!(execution.state(), ExecutionState::Completed);
        assert_eq!(execution.outcome(), Outcome::Output(Some(4.0)));
        match execution {
            Execution::Completed { elapsed, .. } => assert!(elapsed < Duration::from_millis(1_000)),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn times_out_when_work_is_slower() {
        let started = Instant::now();
        let execution = run(2_000, 50);
        assert_eq!(execution.state(), ExecutionState::TimedOut);
        assert_eq!(execution.outcome(), Outcome::Terminated);
        // Returned at the deadline, not when the worker finished.
        assert!(started.elapsed() < Duration::from_millis(1_500));
    }

    #[test]
    fn zero_timeout_is_always_timed_out() {
        let execution = run(0, 0);
        assert_eq!(
            execution,
            Execution::TimedOut {
                deadline: Duration::ZERO
            }
        );
    }

    #[test]
    fn abandoned_worker_keeps_running() {
        struct Flagging(Arc<AtomicBool>);

        impl WorkUnit for Flagging {
            fn run(&self, _: &TrialConfig, _: &mut ChaCha8Rng) -> Result<f64, WorkError> {
                thread::sleep(Duration::from_millis(100));
                self.0.store(true, Ordering::SeqCst);
                Ok(1.0)
            }
        }

        let finished = Arc::new(AtomicBool::new(false));
        let executor = DeadlineExecutor::new(Arc::new(Flagging(Arc::clone(&finished))));
        let config = TrialConfig::new(0.0, 0.0, Duration::from_millis(10));

        let execution = executor.execute(0, &config, trial_rng(0, 0)).unwrap();
        assert_eq!(execution.state(), ExecutionState::TimedOut);
        assert!(!finished.load(Ordering::SeqCst));

        let waited = Instant::now();
        while !finished.load(Ordering::SeqCst) && waited.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn worker_dying_without_a_result_reports_null() {
        struct PanicsOnDrop;

        impl Drop for PanicsOnDrop {
            fn drop(&mut self) {
                panic!("payload dropped");
            }
        }

        // The payload's drop panics after `evaluate` caught the first panic,
        // so the worker thread unwinds without sending.
        struct Escaping;

        impl WorkUnit for Escaping {
            fn run(&self, _: &TrialConfig, _: &mut ChaCha8Rng) -> Result<f64, WorkError> {
                std::panic::panic_any(PanicsOnDrop)
            }
        }

        let executor = DeadlineExecutor::new(Arc::new(Escaping));
        let config = TrialConfig::new(0.0, 0.0, Duration::from_secs(5));
        let started = Instant::now();

        let execution = executor.execute(0, &config, trial_rng(0, 0)).unwrap();

        assert_eq!(execution.state(), ExecutionState::Completed);
        assert_eq!(execution.outcome(), Outcome::Output(None));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn works_through_trait_objects() {
        let work: Arc<dyn WorkUnit> = Arc::new(Sleepy {
            delay: Duration::ZERO,
            value: 2.5,
        });
        let executor = DeadlineExecutor::new(work);
        let config = TrialConfig::new(0.0, 0.0, Duration::from_secs(1));
        let execution = executor.execute(1, &config, trial_rng(0, 1)).unwrap();
        assert_eq!(execution.outcome().value(), Some(2.5));
    }
}
