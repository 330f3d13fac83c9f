//! Results store: every report, in memory and optionally as JSON lines.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use ds_types::{SweepResult, TrialId, TrialResult};

use crate::reporter::ReportSink;

/// File name of the JSON-lines log inside an experiment directory.
pub const RESULTS_FILE: &str = "results.jsonl";


pub struct ResultStore {
    reports: DashMap<TrialId, Vec<TrialResult>>,
    jsonl: Option<Mutex<BufWriter<File>>>,
}

impl ResultStore {
    pub fn in_memory() -> Self {
        Self {
            reports: DashMap::new(),
            jsonl: None,
        }
    }

    /// Store that also appends each report to `<dir>/results.jsonl`,
    /// creating `dir` if needed.
    pub fn with_jsonl(dir: impl AsRef<Path>) -> SweepResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(RESULTS_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "writing trial results");

        Ok(Self {
            reports: DashMap::new(),
            jsonl: Some(Mutex::new(BufWriter::new(file))),
        })
    }

    /// Most recent report for a trial.
    pub fn latest(&self, trial_id: TrialId) -> Option<TrialResult> {
        self.reports
            .get(&trial_id)
            .and_then(|history| history.last().cloned())
    }

    /// Number of trials with at least one report.
    pub fn trial_count(&self) -> usize {
        self.reports.len()
    }

    pub fn flush(&self) -> SweepResult<()> {
        if let Some(sink) = &self.jsonl {
            sink.lock().flush()?;
        }
        Ok(())
    }
}

impl ReportSink for ResultStore {
    fn record(&self, result: TrialResult) -> SweepResult<()> {
        if let Some(sink) = &self.jsonl {
            let line = serde_json::to_string(&result)?;
            let mut writer = sink.lock();
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        debug!(trial_id = %result.trial_id, metrics = ?result.metrics, "recorded report");
        self.reports.entry(result.trial_id).or_default().push(result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_types::{Outcome, ParameterMap};
    use std::io::{BufRead, BufReader};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn result(trial_id: TrialId, outcome: Outcome) -> TrialResult {
        TrialResult::new(trial_id, 0, 1, ParameterMap::new(), outcome)
    }

    #[test]
    fn latest_returns_most_recent_report() {
        let store = ResultStore::in_memory();
        let id = Uuid::new_v4();
        assert!(store.latest(id).is_none());

        store.record(result(id, Outcome::Output(Some(1.0)))).unwrap();
        store.record(result(id, Outcome::Terminated)).unwrap();

        assert_eq!(store.latest(id).unwrap().outcome(), Ok(Outcome::Terminated));
        assert_eq!(store.trial_count(), 1);
    }

    #[test]
    fn jsonl_sink_writes_one_line_per_report() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("sample_experiment");
        let store = ResultStore::with_jsonl(&dir).unwrap();

        let a = result(Uuid::new_v4(), Outcome::Output(Some(0.5)));
        let b = result(Uuid::new_v4(), Outcome::Terminated);
        store.record(a.clone()).unwrap();
        store.record(b.clone()).unwrap();
        store.flush().unwrap();

        let path = dir.join(RESULTS_FILE);
        let lines: Vec<TrialResult> = BufReader::new(File::open(&path).unwrap())
            .lines()
            .map(|l| serde_json::from_str(&l.unwrap()).unwrap())
            .collect();
        assert_eq!(lines, vec![a, b]);
    }
}
