//! deadline-sweep CLI.
//!
//! Runs the demonstration sweep: every point is evaluated under a per-trial
//! timeout, and trials that miss it are stopped.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ds_optimizer::run_experiment;
use ds_types::ExperimentConfig;

#[derive(Parser, Debug)]
#[command(name = "deadline-sweep")]
#[command(about = "Parallel parameter sweep with a per-trial timeout")]
struct Cli {
    /// Timeout for each trial (in seconds)
    #[arg(short = 't', default_value_t = 10)]
    timeout: u64,

    /// Random seed to reproduce the run
    #[arg(short = 'r', env = "DEADLINE_SWEEP_SEED", default_value_t = 42)]
    seed: u64,

    /// Experiment folder name
    #[arg(short = 'n', default_value = "sample_experiment")]
    name: String,

    /// Log directory the experiment folder is created under
    #[arg(short = 'l', env = "DEADLINE_SWEEP_LOG_DIR", default_value = "/tmp")]
    log_dir: PathBuf,

    /// Trials run in parallel
    #[arg(short = 'c', long, default_value_t = 4)]
    concurrency: usize,

    /// Upper bound on simulated work, in seconds
    #[arg(long, default_value_t = 20)]
    max_sleep: u32,

    /// Random points to evaluate after the fixed ones
    #[arg(long, default_value_t = 0)]
    num_samples: usize,

    /// Enable debug output
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    fn experiment_config(&self) -> ExperimentConfig {
        ExperimentConfig::new(self.name.clone())
            .with_log_dir(&self.log_dir)
            .with_seed(self.seed)
            .with_timeout_secs(self.timeout)
            .with_concurrency(self.concurrency)
            .with_sleep(self.max_sleep, Duration::from_secs(1))
            .with_num_samples(self.num_samples)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.experiment_config();
    let experiment_dir = config.experiment_dir();
    let analysis = run_experiment(config)
        .with_context(|| format!("experiment failed ({})", experiment_dir.display()))?;

    if let Some(best) = &analysis.best_trial {
        info!(
            trial_number = best.trial_number,
            config = %serde_json::to_string(&best.config)?,
            metrics = %serde_json::Value::Object(best.metrics.clone()),
            "best trial"
        );
    }

    println!("Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_demo() {
        let cli = Cli::try_parse_from(["deadline-sweep"]).unwrap();
        let config = cli.experiment_config();
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.name, "sample_experiment");
        assert_eq!(config.max_sleep_steps, 20);
        assert_eq!(config.sleep_step, Duration::from_secs(1));
        assert_eq!(config.num_samples, 0);
    }

    #[test]
    fn short_flags() {
        let cli = Cli::try_parse_from([
            "deadline-sweep",
            "-t",
            "3",
            "-r",
            "7",
            "-n",
            "exp",
            "-l",
            "/var/tmp",
            "-c",
            "2",
        ])
        .unwrap();
        let config = cli.experiment_config();
        assert_eq!(config.timeout_secs, 3);
        assert_eq!(config.seed, 7);
        assert_eq!(config.max_concurrent_trials, 2);
        assert_eq!(config.experiment_dir(), PathBuf::from("/var/tmp/exp"));
    }

    #[test]
    fn timeout_beyond_i64_fails_validation() {
        let cli = Cli::try_parse_from(["deadline-sweep", "-t", "9223372036854775808"]).unwrap();
        let err = cli.experiment_config().validate().unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn negative_timeout_is_rejected() {
        assert!(Cli::try_parse_from(["deadline-sweep", "-t", "-1"]).is_err());
    }
}
