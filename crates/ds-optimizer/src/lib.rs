//! # ds-optimizer
//!
//! Deadline-bounded trial execution for deadline-sweep.
//!
//! Each trial runs its work unit on a dedicated thread and waits at most the
//! trial's timeout. A trial that misses its deadline reports a `terminated`
//! marker, which the [`Stopper`] uses to end it. Around that core sits a small
//! local runner: search-point generation, trial tracking, a results store and
//! a thread pool for running trials in parallel.

mod executor;
mod reporter;
mod runner;
mod search;
mod stopper;
mod store;
mod trial;
mod work;

pub use executor::{DeadlineExecutor, Execution, ExecutionState};
pub use reporter::{ReportSink, Reporter};
pub use runner::{run_experiment, TrialRunner};
pub use search::{
    create_points_to_evaluate, demo_search_space, BasicVariantGenerator, GridSearch,
    ParameterDef, RandomSearch, SearchSpace, SearchStrategy,
};
pub use stopper::{Stopper, TerminationStopper};
pub use store::{ResultStore, RESULTS_FILE};
pub use trial::{ExperimentAnalysis, ExperimentState, Trial, TrialStatus};
pub use work::{evaluate, trial_rng, SimulatedWork, WorkPlan, WorkUnit};
