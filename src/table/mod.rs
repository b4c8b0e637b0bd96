//! Observation and prediction record sets.
//!
//! Both containers are immutable once built: filtering returns a new set.
//! Rows are kept sorted by their [`Key`] (time first, then the extra
//! independent columns in declared order).

pub mod observations;
pub mod predictions;
pub mod raw;
pub mod schema;

pub use observations::{ObservationRow, Observations};
pub use predictions::{PredictionRow, Predictions};
pub use raw::RawTable;
pub use schema::{ObservationSchema, PredictionSchema};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Absolute tolerance used whenever two quantile levels are compared.
pub const QUANTILE_TOLERANCE: f64 = 1e-8;

/// Tolerance-based equality of quantile levels.
pub fn quantile_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= QUANTILE_TOLERANCE
}

/// The key tuple identifying a row: a date plus the values of the extra
/// independent columns, in the order the record set declares them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key {
    pub t: NaiveDate,
    pub others: Vec<String>,
}

impl Key {
    pub fn new(t: NaiveDate, others: Vec<String>) -> Self {
        Self { t, others }
    }

    /// Key with only a date.
    pub fn at(t: NaiveDate) -> Self {
        Self { t, others: vec![] }
    }

    /// Keeps the extra values at `positions`, in that order.
    pub fn project(&self, positions: &[usize]) -> Key {
        Key {
            t: self.t,
            others: positions.iter().map(|&i| self.others[i].clone()).collect(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.t)?;
        for value in &self.others {
            write!(f, "/{}", value)?;
        }
        Ok(())
    }
}

/// Kind of prediction carried by a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionType {
    Point,
    Quantile,
}

impl PredictionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionType::Point => "point",
            PredictionType::Quantile => "quantile",
        }
    }
}

impl fmt::Display for PredictionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "point" => Ok(PredictionType::Point),
            "quantile" => Ok(PredictionType::Quantile),
            other => Err(format!("unknown prediction type '{}'", other)),
        }
    }
}

/// Position of every name of `wanted` inside `declared`, or the first
/// missing name.
pub(crate) fn positions_of<'a>(
    declared: &[String],
    wanted: &'a [String],
) -> std::result::Result<Vec<usize>, &'a str> {
    wanted
        .iter()
        .map(|name| {
            declared
                .iter()
                .position(|d| d == name)
                .ok_or(name.as_str())
        })
        .collect()
}
