//! Data types produced by the scoring pipeline.

use crate::table::Key;
use serde::Serialize;
use std::collections::BTreeMap;

/// Interval score of one key for one interval range, with its decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntervalParts {
    pub interval_score: f64,
    pub dispersion: f64,
    pub underprediction: f64,
    pub overprediction: f64,
}

/// Scores of a single key tuple.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRow {
    pub key: Key,
    /// One entry per interval range of the owning [`ScoreTable`], same order.
    pub intervals: Vec<IntervalParts>,
    /// Absent when no interval range was requested.
    pub wis: Option<f64>,
    pub point_absolute_error: f64,
    pub median_absolute_error: f64,
    /// Equal to the median error where the median lies above the observation, else 0.
    pub median_absolute_error_underprediction: f64,
    /// Equal to the median error where the observation lies above the median, else 0.
    pub median_absolute_error_overprediction: f64,
}

/// Long-format per-key scores, one row per key tuple in key order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreTable {
    pub t_col: String,
    pub other_ind_cols: Vec<String>,
    pub interval_ranges: Vec<u32>,
    pub rows: Vec<ScoredRow>,
}

const INTERVAL_PARTS: [&str; 4] = [
    "interval_score",
    "dispersion",
    "underprediction",
    "overprediction",
];

impl ScoreTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Names of the numeric columns, in output order.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for r in &self.interval_ranges {
            names.extend(INTERVAL_PARTS.iter().map(|p| format!("{}_{}", r, p)));
        }
        if !self.interval_ranges.is_empty() {
            names.push("wis".to_string());
        }
        names.extend(
            [
                "point_absolute_error",
                "median_absolute_error",
                "median_absolute_error_underprediction",
                "median_absolute_error_overprediction",
            ]
            .map(String::from),
        );
        names
    }

    /// Numeric column by name (`wis`, `50_dispersion`, ...).
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let pick: fn(&ScoredRow, usize) -> f64 = match name {
            "wis" if !self.interval_ranges.is_empty() => |r, _| r.wis.unwrap_or(f64::NAN),
            "point_absolute_error" => |r, _| r.point_absolute_error,
            "median_absolute_error" => |r, _| r.median_absolute_error,
            "median_absolute_error_underprediction" => {
                |r, _| r.median_absolute_error_underprediction
            }
            "median_absolute_error_overprediction" => {
                |r, _| r.median_absolute_error_overprediction
            }
            _ => {
                let (range, part) = name.split_once('_')?;
                let range: u32 = range.parse().ok()?;
                let idx = self.interval_ranges.iter().position(|&r| r == range)?;
                let pick: fn(&ScoredRow, usize) -> f64 = match part {
                    "interval_score" => |r, i| r.intervals[i].interval_score,
                    "dispersion" => |r, i| r.intervals[i].dispersion,
                    "underprediction" => |r, i| r.intervals[i].underprediction,
                    "overprediction" => |r, i| r.intervals[i].overprediction,
                    _ => return None,
                };
                return Some(self.rows.iter().map(|r| pick(r, idx)).collect());
            }
        };
        Some(self.rows.iter().map(|r| pick(r, 0)).collect())
    }
}

/// Share of the total WIS carried by each component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PartFractions {
    pub dispersion: f64,
    pub underprediction: f64,
    pub overprediction: f64,
}

/// WIS decomposition. Fractions are NaN when the total WIS is zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WisDecomposition {
    /// Contribution of the median term (range 0).
    pub median_underprediction: f64,
    pub median_overprediction: f64,
    pub per_range: BTreeMap<u32, PartFractions>,
    /// Sum over ranges, plus the median term for under/overprediction.
    pub total: PartFractions,
}

/// Aggregate scores of one stratum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub coverage: BTreeMap<u32, f64>,
    pub nb_t_match: usize,
    pub wis_total: Option<f64>,
    pub wis_mean: Option<f64>,
    pub point_absolute_error_total: f64,
    pub point_absolute_error_mean: f64,
    pub median_absolute_error_total: f64,
    pub median_absolute_error_mean: f64,
    pub wis_fractions: Option<WisDecomposition>,
}

impl Summary {
    /// Flat view keyed the way score reports name their fields
    /// (`50_cov`, `wis_total`, `50_dispersion_wis_fraction`, ...).
    pub fn to_flat_map(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for (r, cov) in &self.coverage {
            out.insert(format!("{}_cov", r), *cov);
        }
        out.insert("nb_t_match".to_string(), self.nb_t_match as f64);
        if let Some(total) = self.wis_total {
            out.insert("wis_total".to_string(), total);
        }
        if let Some(mean) = self.wis_mean {
            out.insert("wis_mean".to_string(), mean);
        }
        out.insert(
            "point_absolute_error_total".to_string(),
            self.point_absolute_error_total,
        );
        out.insert(
            "point_absolute_error_mean".to_string(),
            self.point_absolute_error_mean,
        );
        out.insert(
            "median_absolute_error_total".to_string(),
            self.median_absolute_error_total,
        );
        out.insert(
            "median_absolute_error_mean".to_string(),
            self.median_absolute_error_mean,
        );

        if let Some(fr) = &self.wis_fractions {
            out.insert(
                "0_underprediction_wis_fraction".to_string(),
                fr.median_underprediction,
            );
            out.insert(
                "0_overprediction_wis_fraction".to_string(),
                fr.median_overprediction,
            );
            for (r, parts) in &fr.per_range {
                insert_parts(&mut out, &format!("{}_", r), parts);
            }
            insert_parts(&mut out, "", &fr.total);
        }
        out
    }
}

fn insert_parts(out: &mut BTreeMap<String, f64>, prefix: &str, parts: &PartFractions) {
    out.insert(format!("{}dispersion_wis_fraction", prefix), parts.dispersion);
    out.insert(
        format!("{}underprediction_wis_fraction", prefix),
        parts.underprediction,
    );
    out.insert(
        format!("{}overprediction_wis_fraction", prefix),
        parts.overprediction,
    );
}

/// Per-key scores and their aggregate for one stratum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub summary: Summary,
    pub scores: ScoreTable,
}
