//! Local trial runner: fans trials out over a thread pool, runs each one under
//! its deadline, records the report and applies the stopping policy.

use rayon::prelude::*;
use std::sync::Arc;
use tracing::{error, info, info_span, warn};

use ds_types::{
    internal_error, ExperimentConfig, ParameterMap, SweepError, SweepResult, TrialConfig,
    TrialError,
};

use crate::executor::{DeadlineExecutor, ExecutionState};
use crate::reporter::Reporter;
use crate::search::{
    create_points_to_evaluate, demo_search_space, BasicVariantGenerator, SearchStrategy,
};
use crate::stopper::{Stopper, TerminationStopper};
use crate::store::ResultStore;
use crate::trial::{ExperimentAnalysis, Trial};
use crate::work::{trial_rng, SimulatedWork, WorkUnit};

pub struct TrialRunner<W: ?Sized> {
    config: ExperimentConfig,
    executor: DeadlineExecutor<W>,
    stopper: Box<dyn Stopper>,
    store: Arc<ResultStore>,
}

impl<W: WorkUnit + ?Sized> TrialRunner<W> {
    pub fn new(config: ExperimentConfig, work: Arc<W>, store: Arc<ResultStore>) -> Self {
        Self {
            config,
            executor: DeadlineExecutor::new(work),
            stopper: Box::new(TerminationStopper),
            store,
        }
    }

    pub fn with_stopper(mut self, stopper: Box<dyn Stopper>) -> Self {
        self.stopper = stopper;
        self
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    /// Run every point `search` hands out.
    ///
    /// Points are pulled in batches of `max_concurrent_trials`; a batch runs in
    /// parallel and the next one starts once it has drained. Configuration
    /// errors abort the run.
    pub fn run(&self, search: &mut dyn SearchStrategy) -> SweepResult<ExperimentAnalysis> {
        self.config.validate()?;

        let concurrency = self.config.max_concurrent_trials;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .thread_name(|i| format!("trial-runner-{i}"))
            .build()
            .map_err(|e| internal_error!("failed to build trial pool: {e}"))?;

        let mut analysis = ExperimentAnalysis::new(self.config.clone());
        analysis.mark_running();
        info!(
            experiment = %self.config.name,
            strategy = search.name(),
            concurrency,
            timeout_secs = self.config.timeout_secs,
            seed = self.config.seed,
            "starting experiment"
        );

        let mut next_number = 0;
        loop {
            let batch = search.suggest(concurrency);
            if batch.is_empty() {
                break;
            }
            let first = next_number;
            next_number += batch.len();

            let finished: SweepResult<Vec<Trial>> = pool.install(|| {
                batch
                    .into_par_iter()
                    .enumerate()
                    .map(|(i, point)| self.run_trial(first + i, point))
                    .collect()
            });

            match finished {
                Ok(trials) => {
                    for trial in trials {
                        analysis.record_trial(trial);
                    }
                }
                Err(e) => {
                    error!(error = %e, "experiment aborted");
                    analysis.mark_failed(e.to_string());
                    if let Err(flush_err) = self.store.flush() {
                        warn!(error = %flush_err, "failed to flush results after abort");
                    }
                    return Err(e);
                }
            }

            if self.stopper.stop_all() {
                warn!("stopper requested a global stop");
                break;
            }
        }

        self.store.flush()?;
        analysis.mark_completed();
        info!(
            completed = analysis.trials_completed,
            terminated = analysis.trials_terminated,
            failed = analysis.trials_failed,
            best = ?analysis.best_trial.as_ref().map(|r| r.trial_number),
            "experiment finished"
        );
        Ok(analysis)
    }

    /// Run one trial end to end. Only configuration and store errors escape.
    pub fn run_trial(&self, trial_number: usize, point: ParameterMap) -> SweepResult<Trial> {
        let _span = info_span!("trial", trial_number).entered();

        let mut params = self.config.base_params();
        params.extend(point);

        let mut trial = Trial::new(self.config.id, trial_number, params.clone());
        let config = TrialConfig::from_params(&params)?;
        trial.mark_running(std::thread::current().name().map(str::to_string));

        let rng = trial_rng(self.config.seed, trial_number);
        let execution = match self.executor.execute(trial_number, &config, rng) {
            Ok(execution) => execution,
            Err(e @ TrialError::SpawnFailed { .. }) => {
                error!(error = %e, "trial failed");
                trial.mark_failed(e.to_string());
                return Ok(trial);
            }
            Err(e) => return Err(SweepError::from(e)),
        };

        let result = Reporter::new(self.store.as_ref(), trial.id, trial_number, params)
            .report_execution(&execution)?;

        if self.stopper.should_stop(trial.id, &result) {
            info!(state = ?execution.state(), "trial stopped");
            trial.mark_terminated(result);
        } else {
            if execution.state() != ExecutionState::Completed {
                warn!(state = ?execution.state(), "stopper let an unfinished trial continue");
            }
            info!(metrics = ?result.metrics, "trial completed");
            trial.mark_completed(result);
        }
        Ok(trial)
    }
}

/// Run the demonstration sweep described by `config`: the four fixed points
/// (plus any random samples) through [`SimulatedWork`], results appended under
/// the experiment directory.
pub fn run_experiment(config: ExperimentConfig) -> SweepResult<ExperimentAnalysis> {
    config.validate()?;

    let store = Arc::new(ResultStore::with_jsonl(config.experiment_dir())?);
    let work = Arc::new(SimulatedWork::new(config.max_sleep_steps, config.sleep_step));
    let mut search = BasicVariantGenerator::new(create_points_to_evaluate())
        .with_random_samples(demo_search_space(), config.num_samples, config.seed)?;

    TrialRunner::new(config, work, store).run(&mut search)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::{ExperimentState, TrialStatus};
    use ds_types::{ParameterValue, INPUT_ARG1_KEY, TIMEOUT_KEY};
    use std::time::Duration;

    fn fast_config(name: &str) -> ExperimentConfig {
        ExperimentConfig::new(name)
            .with_timeout_secs(5)
            .with_sleep(0, Duration::ZERO)
    }

    #[test]
    fn demo_sweep_completes_every_point() {
        let store = Arc::new(ResultStore::in_memory());
        let runner = TrialRunner::new(
            fast_config("demo"),
            Arc::new(SimulatedWork::new(0, Duration::ZERO)),
            Arc::clone(&store),
        );
        let mut search = BasicVariantGenerator::new(create_points_to_evaluate());

        let analysis = runner.run(&mut search).unwrap();

        assert_eq!(analysis.state, ExperimentState::Completed);
        assert_eq!(analysis.trials.len(), 4);
        assert_eq!(analysis.trials_completed, 4);
        assert_eq!(analysis.trials_terminated, 0);
        assert_eq!(store.trial_count(), 4);
        assert!(analysis.best_trial.is_some());
    }

    #[test]
    fn missing_key_aborts_the_run() {
        let runner = TrialRunner::new(
            fast_config("broken"),
            Arc::new(SimulatedWork::new(0, Duration::ZERO)),
            Arc::new(ResultStore::in_memory()),
        );
        let mut point = ParameterMap::new();
        point.insert(INPUT_ARG1_KEY.into(), ParameterValue::Int(1));
        let mut search = BasicVariantGenerator::new(vec![point]);

        match runner.run(&mut search) {
            Err(SweepError::Trial(TrialError::MissingKey { key })) => assert_eq!(key, "input_arg2"),
            other => panic!("expected missing key error, got {other:?}"),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn flush_failure_keeps_the_abort_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::os::unix::fs::symlink("/dev/full", tmp.path().join(crate::store::RESULTS_FILE))
            .unwrap();
        let store = Arc::new(ResultStore::with_jsonl(tmp.path()).unwrap());
        let runner = TrialRunner::new(
            fast_config("full-disk").with_concurrency(1),
            Arc::new(SimulatedWork::new(0, Duration::ZERO)),
            store,
        );
        // The first trial leaves a buffered line that cannot be flushed.
        let mut broken = ParameterMap::new();
        broken.insert(INPUT_ARG1_KEY.into(), ParameterValue::Int(1));
        let good = create_points_to_evaluate().remove(0);
        let mut search = BasicVariantGenerator::new(vec![good, broken]);

        match runner.run(&mut search) {
            Err(SweepError::Trial(TrialError::MissingKey { key })) => assert_eq!(key, "input_arg2"),
            other => panic!("expected missing key error, got {other:?}"),
        }
    }

    #[test]
    fn point_overrides_base_timeout() {
        let runner = TrialRunner::new(
            fast_config("override"),
            Arc::new(SimulatedWork::new(0, Duration::ZERO)),
            Arc::new(ResultStore::in_memory()),
        );
        let mut point = create_points_to_evaluate().remove(0);
        point.insert(TIMEOUT_KEY.into(), ParameterValue::Int(0));

        let trial = runner.run_trial(0, point).unwrap();
        assert_eq!(trial.status, TrialStatus::Terminated);
        assert_eq!(trial.parameters[TIMEOUT_KEY], ParameterValue::Int(0));
    }

    #[test]
    fn global_stop_ends_after_first_batch() {
        struct StopEverything;

        impl Stopper for StopEverything {
            fn should_stop(&self, _: ds_types::TrialId, _: &ds_types::TrialResult) -> bool {
                false
            }

            fn stop_all(&self) -> bool {
                true
            }
        }

        let runner = TrialRunner::new(
            fast_config("stop-all").with_concurrency(2),
            Arc::new(SimulatedWork::new(0, Duration::ZERO)),
            Arc::new(ResultStore::in_memory()),
        )
        .with_stopper(Box::new(StopEverything));
        let mut search = BasicVariantGenerator::new(create_points_to_evaluate());

        let analysis = runner.run(&mut search).unwrap();
        assert_eq!(analysis.trials.len(), 2);
    }

    #[test]
    fn run_experiment_writes_results_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = fast_config("sample_experiment")
            .with_log_dir(tmp.path())
            .with_num_samples(2);

        let analysis = run_experiment(config).unwrap();
        assert_eq!(analysis.trials.len(), 6);

        let path = tmp
            .path()
            .join("sample_experiment")
            .join(crate::store::RESULTS_FILE);
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 6);
    }
}
