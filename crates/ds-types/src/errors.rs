use thiserror::Error;

/// Main error type for deadline-sweep
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Trial error: {0}")]
    Trial(#[from] TrialError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Search-point generation errors
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Empty search space: no parameters defined")]
    EmptySpace,

    #[error("Invalid range for {parameter}: low {low} is above high {high}")]
    InvalidRange { parameter: String, low: i64, high: i64 },
}

/// Trial-level errors
#[derive(Error, Debug)]
pub enum TrialError {
    #[error("Missing required config key: {key}")]
    MissingKey { key: String },

    #[error("Config key {key} is not numeric: {value}")]
    NotNumeric { key: String, value: String },

    #[error("Timeout must be a finite, non-negative number of seconds, got {seconds}")]
    InvalidTimeout { seconds: f64 },

    #[error("Failed to spawn worker thread for trial {trial_number}: {message}")]
    SpawnFailed { trial_number: usize, message: String },
}

/// Errors raised while decoding an outcome record
#[derive(Error, Debug, PartialEq)]
pub enum ReportError {
    #[error("Outcome record carries both `{output}` and `{terminated}`")]
    BothPresent {
        output: &'static str,
        terminated: &'static str,
    },

    #[error("Outcome record carries neither `{output}` nor `{terminated}`")]
    NeitherPresent {
        output: &'static str,
        terminated: &'static str,
    },

    #[error("Outcome record key `{key}` has an unexpected value: {value}")]
    BadValue { key: &'static str, value: String },
}

/// Failure raised inside a work unit. Never leaves the executor.
#[derive(Error, Debug)]
pub enum WorkError {
    #[error("Work unit computation failed: {message}")]
    Computation { message: String },

    #[error("Work unit panicked: {message}")]
    Panicked { message: String },

    #[error("Work unit config error: {0}")]
    Config(#[from] TrialError),
}

/// Result type alias for deadline-sweep operations
pub type SweepResult<T> = Result<T, SweepError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::SweepError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::SweepError::Internal(format!($($arg)*))
    };
}
