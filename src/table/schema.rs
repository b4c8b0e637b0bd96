//! Mapping of logical roles to physical column names.
//!
//! A schema is resolved against a [`RawTable`] header once, so missing
//! columns fail at construction rather than at first use.

use crate::error::{Result, ScoreError};
use crate::table::RawTable;
use chrono::NaiveDate;
use csv::StringRecord;
use serde::{Deserialize, Serialize};

/// Column roles of an observation table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationSchema {
    pub t_col: String,
    pub value_col: String,
    pub other_ind_cols: Vec<String>,
}

impl Default for ObservationSchema {
    fn default() -> Self {
        Self {
            t_col: "date".to_string(),
            value_col: "value".to_string(),
            other_ind_cols: vec![],
        }
    }
}

impl ObservationSchema {
    pub fn with_t_col(mut self, name: &str) -> Self {
        self.t_col = name.to_string();
        self
    }

    pub fn with_value_col(mut self, name: &str) -> Self {
        self.value_col = name.to_string();
        self
    }

    pub fn with_other_ind_cols(mut self, names: &[&str]) -> Self {
        self.other_ind_cols = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub(crate) fn resolve(&self, raw: &RawTable) -> Result<ResolvedObservations> {
        Ok(ResolvedObservations {
            t: require(raw, "time", &self.t_col)?,
            value: require(raw, "value", &self.value_col)?,
            others: resolve_others(raw, &self.other_ind_cols)?,
        })
    }
}

/// Column roles of a prediction table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionSchema {
    pub t_col: String,
    pub value_col: String,
    pub quantile_col: String,
    pub type_col: String,
    pub other_ind_cols: Vec<String>,
}

impl Default for PredictionSchema {
    fn default() -> Self {
        Self {
            t_col: "target_end_date".to_string(),
            value_col: "value".to_string(),
            quantile_col: "quantile".to_string(),
            type_col: "type".to_string(),
            other_ind_cols: vec![],
        }
    }
}

impl PredictionSchema {
    pub fn with_t_col(mut self, name: &str) -> Self {
        self.t_col = name.to_string();
        self
    }

    pub fn with_value_col(mut self, name: &str) -> Self {
        self.value_col = name.to_string();
        self
    }

    pub fn with_quantile_col(mut self, name: &str) -> Self {
        self.quantile_col = name.to_string();
        self
    }

    pub fn with_type_col(mut self, name: &str) -> Self {
        self.type_col = name.to_string();
        self
    }

    pub fn with_other_ind_cols(mut self, names: &[&str]) -> Self {
        self.other_ind_cols = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub(crate) fn resolve(&self, raw: &RawTable) -> Result<ResolvedPredictions> {
        Ok(ResolvedPredictions {
            t: require(raw, "time", &self.t_col)?,
            value: require(raw, "value", &self.value_col)?,
            quantile: require(raw, "quantile", &self.quantile_col)?,
            // an absent type column means every row is a quantile
            kind: raw.column_index(&self.type_col),
            others: resolve_others(raw, &self.other_ind_cols)?,
        })
    }
}

pub(crate) struct ResolvedObservations {
    pub t: usize,
    pub value: usize,
    pub others: Vec<usize>,
}

pub(crate) struct ResolvedPredictions {
    pub t: usize,
    pub value: usize,
    pub quantile: usize,
    pub kind: Option<usize>,
    pub others: Vec<usize>,
}

fn require(raw: &RawTable, role: &'static str, column: &str) -> Result<usize> {
    raw.column_index(column)
        .ok_or_else(|| ScoreError::MissingColumn {
            role,
            column: column.to_string(),
        })
}

fn resolve_others(raw: &RawTable, names: &[String]) -> Result<Vec<usize>> {
    names
        .iter()
        .map(|name| require(raw, "independent", name))
        .collect()
}

/// Reads the cell at `idx`, trimmed.
pub(crate) fn cell<'a>(
    record: &'a StringRecord,
    row: usize,
    idx: usize,
    headers: &[String],
) -> Result<&'a str> {
    record
        .get(idx)
        .map(str::trim)
        .ok_or_else(|| ScoreError::InvalidValue {
            row,
            column: headers[idx].clone(),
            reason: "record is too short".to_string(),
        })
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time part.
pub(crate) fn parse_date(s: &str, row: usize, column: &str) -> Result<NaiveDate> {
    let date_part = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|e| ScoreError::InvalidValue {
        row,
        column: column.to_string(),
        reason: format!("'{}' is not a date: {}", s, e),
    })
}

pub(crate) fn parse_value(s: &str, row: usize, column: &str) -> Result<f64> {
    s.parse::<f64>().map_err(|e| ScoreError::InvalidValue {
        row,
        column: column.to_string(),
        reason: format!("'{}' is not a number: {}", s, e),
    })
}

/// Empty, `NA` and `NaN` cells are unset.
pub(crate) fn parse_optional(s: &str, row: usize, column: &str) -> Result<Option<f64>> {
    if s.is_empty() || s.eq_ignore_ascii_case("na") || s.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    parse_value(s, row, column).map(Some)
}
