//! Error types for the scoring core.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ScoreError>;

/// Failures raised while building record sets or scoring them.
#[derive(Error, Debug)]
pub enum ScoreError {
    /// Observation, lower and upper sequences differ in length
    #[error("vector shape mismatch: observation={observation}, lower={lower}, upper={upper}")]
    ShapeMismatch {
        observation: usize,
        lower: usize,
        upper: usize,
    },

    /// Interval range is not a percentage
    #[error("interval range should be between 0 and 100, got {0}")]
    IntervalRangeOutOfBounds(f64),

    /// The same interval range was requested twice
    #[error("interval range {0} is requested more than once")]
    DuplicateIntervalRange(u32),

    /// A logical role points at a column that is not in the input
    #[error("missing {role} column '{column}'")]
    MissingColumn { role: &'static str, column: String },

    /// A cell could not be interpreted for its role
    #[error("invalid value in row {row}, column '{column}': {reason}")]
    InvalidValue {
        row: usize,
        column: String,
        reason: String,
    },

    /// Two rows share a key where the record set forbids it
    #[error("duplicate key {0}")]
    DuplicateKey(String),

    /// Observation and prediction keys differ while mismatches are disallowed
    #[error(
        "values for the independent columns do not match: {only_in_observations} key(s) only in observations, {only_in_predictions} only in predictions"
    )]
    KeyMismatch {
        only_in_observations: usize,
        only_in_predictions: usize,
    },

    /// No quantile 0.5 rows at all
    #[error("the median must be calculated")]
    MissingMedian,

    /// A key has no row for a quantile required by a requested range
    #[error("no prediction at quantile {quantile} for key {key}")]
    MissingQuantile { quantile: f64, key: String },

    /// Lower quantile value above upper quantile value
    #[error(
        "non-monotonic quantiles at key {key} for the {interval_range}% interval: lower {lower} > upper {upper}"
    )]
    NonMonotonicQuantiles {
        key: String,
        interval_range: u32,
        lower: f64,
        upper: f64,
    },

    /// Ensemble requested over no prediction sets or incompatible ones
    #[error("cannot build ensemble: {0}")]
    EmptyEnsemble(String),

    /// CSV decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Zip archive could not be opened or has no entry
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}
