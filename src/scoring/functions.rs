//! Score functions for a single prediction interval.

use crate::error::{Result, ScoreError};

/// Interval score of one interval over a sequence of observations, with its
/// decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalScore {
    pub interval_score: Vec<f64>,
    pub dispersion: Vec<f64>,
    pub underprediction: Vec<f64>,
    pub overprediction: Vec<f64>,
}

impl IntervalScore {
    /// The four sequences keyed by name, prefixed with `{range}_` when a
    /// range is given.
    pub fn columns(&self, interval_range: Option<u32>) -> Vec<(String, &[f64])> {
        let prefix = interval_range
            .map(|r| format!("{}_", r))
            .unwrap_or_default();
        vec![
            (format!("{}interval_score", prefix), &self.interval_score[..]),
            (format!("{}dispersion", prefix), &self.dispersion[..]),
            (format!("{}underprediction", prefix), &self.underprediction[..]),
            (format!("{}overprediction", prefix), &self.overprediction[..]),
        ]
    }
}

fn check_shape(observation: &[f64], lower: &[f64], upper: &[f64]) -> Result<()> {
    if lower.len() != upper.len() || lower.len() != observation.len() {
        return Err(ScoreError::ShapeMismatch {
            observation: observation.len(),
            lower: lower.len(),
            upper: upper.len(),
        });
    }
    Ok(())
}

/// Interval score of the central `interval_range`% prediction interval.
///
/// With `alpha = 1 - interval_range / 100`:
/// `score = (upper - lower) + 2/alpha * (lower - obs)+ + 2/alpha * (obs - upper)+`.
pub fn interval_score(
    observation: &[f64],
    lower: &[f64],
    upper: &[f64],
    interval_range: f64,
) -> Result<IntervalScore> {
    check_shape(observation, lower, upper)?;
    if !(0.0..=100.0).contains(&interval_range) {
        return Err(ScoreError::IntervalRangeOutOfBounds(interval_range));
    }

    let alpha = 1.0 - interval_range / 100.0;
    let n = observation.len();
    let mut out = IntervalScore {
        interval_score: Vec::with_capacity(n),
        dispersion: Vec::with_capacity(n),
        underprediction: Vec::with_capacity(n),
        overprediction: Vec::with_capacity(n),
    };

    for ((&obs, &l), &u) in observation.iter().zip(lower).zip(upper) {
        let dispersion = u - l;
        let underprediction = if obs < l { (2.0 / alpha) * (l - obs) } else { 0.0 };
        let overprediction = if obs > u { (2.0 / alpha) * (obs - u) } else { 0.0 };

        out.dispersion.push(dispersion);
        out.underprediction.push(underprediction);
        out.overprediction.push(overprediction);
        out.interval_score
            .push(dispersion + underprediction + overprediction);
    }

    Ok(out)
}

/// Fraction of observations with `lower <= obs <= upper`. NaN for empty input.
pub fn coverage(observation: &[f64], lower: &[f64], upper: &[f64]) -> Result<f64> {
    check_shape(observation, lower, upper)?;
    if observation.is_empty() {
        return Ok(f64::NAN);
    }

    let inside = observation
        .iter()
        .zip(lower)
        .zip(upper)
        .filter(|&((obs, l), u)| obs >= l && obs <= u)
        .count();

    Ok(inside as f64 / observation.len() as f64)
}
