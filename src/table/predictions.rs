use crate::error::{Result, ScoreError};
use crate::table::schema::{cell, parse_date, parse_optional, parse_value};
use crate::table::{Key, PredictionSchema, PredictionType, RawTable, quantile_eq};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// One predicted value, either a point estimate or a quantile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRow {
    pub key: Key,
    #[serde(rename = "type")]
    pub kind: PredictionType,
    pub quantile: Option<f64>,
    pub value: f64,
}

impl PredictionRow {
    pub fn quantile(key: Key, quantile: f64, value: f64) -> Self {
        Self {
            key,
            kind: PredictionType::Quantile,
            quantile: Some(quantile),
            value,
        }
    }

    pub fn point(key: Key, value: f64) -> Self {
        Self {
            key,
            kind: PredictionType::Point,
            quantile: None,
            value,
        }
    }

    /// Whether this is a quantile row at level `q`.
    pub fn is_quantile(&self, q: f64) -> bool {
        self.kind == PredictionType::Quantile && self.quantile.is_some_and(|x| quantile_eq(x, q))
    }
}

pub(crate) fn row_order(a: &PredictionRow, b: &PredictionRow) -> Ordering {
    a.key
        .cmp(&b.key)
        .then(a.kind.cmp(&b.kind))
        .then_with(|| match (a.quantile, b.quantile) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (x, y) => x.is_some().cmp(&y.is_some()),
        })
}

/// Forecasts sorted by (key, type, quantile).
///
/// A key holds at most one point row and at most one row per quantile
/// level, levels being compared with [`quantile_eq`].
#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    other_ind_cols: Vec<String>,
    rows: Vec<PredictionRow>,
}

impl Predictions {
    pub fn new(other_ind_cols: Vec<String>, mut rows: Vec<PredictionRow>) -> Result<Self> {
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
            if row.kind == PredictionType::Quantile {
                match row.quantile {
                    Some(q) if (0.0..=1.0).contains(&q) => {}
                    Some(q) => {
                        return Err(ScoreError::InvalidValue {
                            row: i,
                            column: "quantile".to_string(),
                            reason: format!("quantile {} outside [0, 1]", q),
                        });
                    }
                    None => {
                        return Err(ScoreError::InvalidValue {
                            row: i,
                            column: "quantile".to_string(),
                            reason: "quantile row without a quantile level".to_string(),
                        });
                    }
                }
            }
        }

        rows.sort_by(row_order);

        for pair in rows.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if a.key != b.key || a.kind != b.kind {
                continue;
            }
            let clash = match a.kind {
                PredictionType::Point => true,
                PredictionType::Quantile => match (a.quantile, b.quantile) {
                    (Some(x), Some(y)) => quantile_eq(x, y),
                    _ => false,
                },
            };
            if clash {
                return Err(ScoreError::DuplicateKey(format!(
                    "{} ({}{})",
                    a.key,
                    a.kind,
                    a.quantile.map(|q| format!(" {}", q)).unwrap_or_default()
                )));
            }
        }

        Ok(Self {
            other_ind_cols,
            rows,
        })
    }

    pub fn from_raw(raw: &RawTable, schema: &PredictionSchema) -> Result<Self> {
        let cols = schema.resolve(raw)?;
        let headers = &raw.headers;

        let mut rows = Vec::with_capacity(raw.len());
        for (i, record) in raw.records.iter().enumerate() {
            let t = parse_date(cell(record, i, cols.t, headers)?, i, &schema.t_col)?;
            let value = parse_value(cell(record, i, cols.value, headers)?, i, &schema.value_col)?;
            let quantile = parse_optional(
                cell(record, i, cols.quantile, headers)?,
                i,
                &schema.quantile_col,
            )?;
            let kind = match cols.kind {
                Some(idx) => cell(record, i, idx, headers)?
                    .parse::<PredictionType>()
                    .map_err(|reason| ScoreError::InvalidValue {
                        row: i,
                        column: schema.type_col.clone(),
                        reason,
                    })?,
                None => PredictionType::Quantile,
            };
            let others = cols
                .others
                .iter()
                .map(|&idx| cell(record, i, idx, headers).map(str::to_string))
                .collect::<Result<Vec<_>>>()?;

            rows.push(PredictionRow {
                key: Key::new(t, others),
                kind,
                quantile,
                value,
            });
        }

        Self::new(schema.other_ind_cols.clone(), rows)
    }

    pub fn other_ind_cols(&self) -> &[String] {
        &self.other_ind_cols
    }

    pub fn rows(&self) -> &[PredictionRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct keys, in order.
    pub fn keys(&self) -> BTreeSet<&Key> {
        self.rows.iter().map(|r| &r.key).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.other_ind_cols.iter().position(|c| c == name)
    }

    pub fn column_values(&self, name: &str) -> Option<BTreeSet<String>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r.key.others[idx].clone()).collect())
    }

    /// Quantile rows at level `q`, in key order.
    pub fn quantile_rows(&self, q: f64) -> impl Iterator<Item = &PredictionRow> {
        self.rows.iter().filter(move |r| r.is_quantile(q))
    }

    pub fn point_rows(&self) -> impl Iterator<Item = &PredictionRow> {
        self.rows
            .iter()
            .filter(|r| r.kind == PredictionType::Point)
    }

    pub fn has_quantile(&self, q: f64) -> bool {
        self.quantile_rows(q).next().is_some()
    }

    /// Number of distinct prediction types present at each key.
    pub fn type_counts(&self) -> BTreeMap<&Key, usize> {
        let mut kinds: BTreeMap<&Key, BTreeSet<PredictionType>> = BTreeMap::new();
        for row in &self.rows {
            kinds.entry(&row.key).or_default().insert(row.kind);
        }
        kinds.into_iter().map(|(k, v)| (k, v.len())).collect()
    }

    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: Fn(&PredictionRow) -> bool,
    {
        Self {
            other_ind_cols: self.other_ind_cols.clone(),
            rows: self.rows.iter().filter(|r| predicate(r)).cloned().collect(),
        }
    }

    pub fn select(&self, column: &str, value: &str) -> Self {
        match self.column_index(column) {
            Some(idx) => self.filter(|r| r.key.others[idx] == value),
            None => self.clone(),
        }
    }
}
