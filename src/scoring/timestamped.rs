//! Per-key scores: interval scores for every requested range, the weighted
//! interval score and absolute errors.

use crate::error::{Result, ScoreError};
use crate::scoring::align::Alignment;
use crate::scoring::functions::interval_score;
use crate::scoring::types::{IntervalParts, ScoreTable, ScoredRow};
use crate::table::{Observations, Predictions};
use tracing::{debug, warn};

/// Lower and upper quantile levels of the central `interval_range`% interval.
pub fn interval_quantiles(interval_range: u32) -> (f64, f64) {
    let half = f64::from(interval_range) / 200.0;
    (0.5 - half, 0.5 + half)
}

/// Scores every key shared by `obs` and `preds`.
///
/// The WIS of a key is
/// `(0.5 * |obs - median| + sum_k 0.5 * alpha_k * IS_k) / (K + 0.5)`.
/// With no interval range only the absolute errors are produced.
/// Keys must match exactly; see [`crate::scoring::align`].
pub fn all_timestamped_scores(
    obs: &Observations,
    preds: &Predictions,
    interval_ranges: &[u32],
) -> Result<ScoreTable> {
    timestamped_scores(&Alignment::new(obs, preds)?, interval_ranges)
}

pub(crate) fn timestamped_scores(aligned: &Alignment, interval_ranges: &[u32]) -> Result<ScoreTable> {
    let obs = aligned.observations();
    let values = obs.values();

    let median = aligned.median_column()?;
    let (point, substituted) = aligned.point_column(&median);
    if substituted > 0 {
        warn!(
            keys = substituted,
            "No point prediction, using the median as point estimate"
        );
    }

    let mut rows: Vec<ScoredRow> = obs
        .keys()
        .zip(values.iter().zip(median.iter().zip(&point)))
        .map(|(key, (&o, (&m, &p)))| {
            let mae = (o - m).abs();
            ScoredRow {
                key: key.clone(),
                intervals: Vec::with_capacity(interval_ranges.len()),
                wis: None,
                point_absolute_error: (o - p).abs(),
                median_absolute_error: mae,
                median_absolute_error_underprediction: if m > o { mae } else { 0.0 },
                median_absolute_error_overprediction: if o > m { mae } else { 0.0 },
            }
        })
        .collect();

    if !interval_ranges.is_empty() {
        let mut wis: Vec<f64> = rows
            .iter()
            .map(|r| 0.5 * r.median_absolute_error)
            .collect();

        for &range in interval_ranges {
            let (q_low, q_upp) = interval_quantiles(range);
            let lower = aligned.quantile_column(q_low)?;
            let upper = aligned.quantile_column(q_upp)?;

            if let Some(i) = (0..lower.len()).find(|&i| lower[i] > upper[i]) {
                return Err(ScoreError::NonMonotonicQuantiles {
                    key: rows[i].key.to_string(),
                    interval_range: range,
                    lower: lower[i],
                    upper: upper[i],
                });
            }

            let score = interval_score(&values, &lower, &upper, f64::from(range))?;
            let alpha = 1.0 - f64::from(range) / 100.0;

            // rows and every column share the observation key order
            for (i, row) in rows.iter_mut().enumerate() {
                wis[i] += 0.5 * alpha * score.interval_score[i];
                row.intervals.push(IntervalParts {
                    interval_score: score.interval_score[i],
                    dispersion: score.dispersion[i],
                    underprediction: score.underprediction[i],
                    overprediction: score.overprediction[i],
                });
            }
            debug!(interval_range = range, q_low, q_upp, "Interval scored");
        }

        let norm = interval_ranges.len() as f64 + 0.5;
        for (row, w) in rows.iter_mut().zip(wis) {
            row.wis = Some(w / norm);
        }
    }

    Ok(ScoreTable {
        t_col: obs.t_col().to_string(),
        other_ind_cols: obs.other_ind_cols().to_vec(),
        interval_ranges: interval_ranges.to_vec(),
        rows,
    })
}
