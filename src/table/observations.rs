use crate::error::{Result, ScoreError};
use crate::table::schema::{cell, parse_date, parse_value};
use crate::table::{Key, ObservationSchema, RawTable};
use serde::Serialize;
use std::collections::BTreeSet;

/// One realized outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationRow {
    pub key: Key,
    pub value: f64,
}

/// Ground truth, sorted by key, with unique keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Observations {
    t_col: String,
    other_ind_cols: Vec<String>,
    rows: Vec<ObservationRow>,
}

impl Observations {
    /// Builds the set, sorting rows and checking key uniqueness. Values
    /// must be finite.
    pub fn new(other_ind_cols: Vec<String>, mut rows: Vec<ObservationRow>) -> Result<Self> {
        for (i, row) in rows.iter().enumerate() {
            if row.key.others.len() != other_ind_cols.len() {
                return Err(ScoreError::InvalidValue {
                    row: i,
                    column: other_ind_cols.join(","),
                    reason: format!(
                        "key has {} extra value(s), expected {}",
                        row.key.others.len(),
                        other_ind_cols.len()
                    ),
                });
            }
            if !row.value.is_finite() {
                return Err(ScoreError::InvalidValue {
                    row: i,
                    column: "value".to_string(),
                    reason: format!("non-finite value {}", row.value),
                });
            }
        }

        rows.sort_by(|a, b| a.key.cmp(&b.key));

        if let Some(pair) = rows.windows(2).find(|w| w[0].key == w[1].key) {
            return Err(ScoreError::DuplicateKey(pair[0].key.to_string()));
        }

        Ok(Self {
            t_col: "date".to_string(),
            other_ind_cols,
            rows,
        })
    }

    /// Renames the time column used when reporting scores.
    pub fn with_t_col(mut self, name: &str) -> Self {
        self.t_col = name.to_string();
        self
    }

    pub fn from_raw(raw: &RawTable, schema: &ObservationSchema) -> Result<Self> {
        let cols = schema.resolve(raw)?;
        let headers = &raw.headers;

        let mut rows = Vec::with_capacity(raw.len());
        for (i, record) in raw.records.iter().enumerate() {
            let t = parse_date(cell(record, i, cols.t, headers)?, i, &schema.t_col)?;
            let value = parse_value(cell(record, i, cols.value, headers)?, i, &schema.value_col)?;
            let others = cols
                .others
                .iter()
                .map(|&idx| cell(record, i, idx, headers).map(str::to_string))
                .collect::<Result<Vec<_>>>()?;

            rows.push(ObservationRow {
                key: Key::new(t, others),
                value,
            });
        }

        Ok(Self::new(schema.other_ind_cols.clone(), rows)?.with_t_col(&schema.t_col))
    }

    pub fn t_col(&self) -> &str {
        &self.t_col
    }

    pub fn other_ind_cols(&self) -> &[String] {
        &self.other_ind_cols
    }

    pub fn rows(&self) -> &[ObservationRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.rows.iter().map(|r| &r.key)
    }

    pub fn values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.value).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.other_ind_cols.iter().position(|c| c == name)
    }

    /// Distinct values of an extra independent column.
    pub fn column_values(&self, name: &str) -> Option<BTreeSet<String>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r.key.others[idx].clone()).collect())
    }

    /// Rows matching `predicate`, as a new set. Sort order is preserved.
    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: Fn(&ObservationRow) -> bool,
    {
        Self {
            t_col: self.t_col.clone(),
            other_ind_cols: self.other_ind_cols.clone(),
            rows: self.rows.iter().filter(|r| predicate(r)).cloned().collect(),
        }
    }

    /// Rows whose `column` equals `value`. A column the set does not
    /// declare leaves it unchanged.
    pub fn select(&self, column: &str, value: &str) -> Self {
        match self.column_index(column) {
            Some(idx) => self.filter(|r| r.key.others[idx] == value),
            None => self.clone(),
        }
    }
}
