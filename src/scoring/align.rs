//! Alignment of observations with predictions on their shared key columns.
//!
//! Prediction keys are projected onto the observation's independent columns
//! (time plus the observation's extra columns, in the observation's order).
//! Prediction columns the observation does not declare must be constant
//! within the set being scored; stratify on them otherwise.

use crate::error::{Result, ScoreError};
use crate::table::{Key, Observations, PredictionType, Predictions, positions_of, quantile_eq};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Positions of the observation's extra columns inside the prediction key.
fn projection(obs: &Observations, preds: &Predictions) -> Result<Vec<usize>> {
    positions_of(preds.other_ind_cols(), obs.other_ind_cols()).map_err(|missing| {
        ScoreError::MissingColumn {
            role: "prediction independent",
            column: missing.to_string(),
        }
    })
}

fn projected_keys(preds: &Predictions, positions: &[usize]) -> BTreeSet<Key> {
    preds.rows().iter().map(|r| r.key.project(positions)).collect()
}

fn key_sets(obs: &Observations, preds: &Predictions) -> Result<(BTreeSet<Key>, BTreeSet<Key>)> {
    let positions = projection(obs, preds)?;
    let obs_keys: BTreeSet<Key> = obs.keys().cloned().collect();
    Ok((obs_keys, projected_keys(preds, &positions)))
}

fn mismatch(obs_keys: &BTreeSet<Key>, pred_keys: &BTreeSet<Key>) -> ScoreError {
    ScoreError::KeyMismatch {
        only_in_observations: obs_keys.difference(pred_keys).count(),
        only_in_predictions: pred_keys.difference(obs_keys).count(),
    }
}

/// Fails with [`ScoreError::KeyMismatch`] unless both sides hold the same
/// de-duplicated key tuples.
pub fn check_keys_match(obs: &Observations, preds: &Predictions) -> Result<()> {
    let (obs_keys, pred_keys) = key_sets(obs, preds)?;
    if obs_keys != pred_keys {
        return Err(mismatch(&obs_keys, &pred_keys));
    }
    Ok(())
}

/// The [`ScoreError::KeyMismatch`] describing how the two key sets differ.
pub(crate) fn key_mismatch(obs: &Observations, preds: &Predictions) -> Result<ScoreError> {
    let (obs_keys, pred_keys) = key_sets(obs, preds)?;
    Ok(mismatch(&obs_keys, &pred_keys))
}

/// Restricts both sides to the key tuples present in both. Each side is
/// filtered independently; the inputs are untouched.
pub fn intersect(obs: &Observations, preds: &Predictions) -> Result<(Observations, Predictions)> {
    let positions = projection(obs, preds)?;
    let (obs_keys, pred_keys) = key_sets(obs, preds)?;

    let obs_out = obs.filter(|r| pred_keys.contains(&r.key));
    let preds_out = preds.filter(|r| obs_keys.contains(&r.key.project(&positions)));

    debug!(
        observations_before = obs.len(),
        observations_after = obs_out.len(),
        predictions_before = preds.len(),
        predictions_after = preds_out.len(),
        "Intersected observations and predictions"
    );

    Ok((obs_out, preds_out))
}

/// Keeps only keys carrying at least two distinct prediction types, i.e.
/// both a point and quantiles.
pub fn retain_point_and_quantile_keys(preds: &Predictions) -> Predictions {
    let usable: BTreeSet<Key> = preds
        .type_counts()
        .into_iter()
        .filter(|&(_, n)| n >= 2)
        .map(|(k, _)| k.clone())
        .collect();
    preds.filter(|r| usable.contains(&r.key))
}

/// Applies the retention rule (when asked) and then either intersects the
/// two sides or checks that their keys match.
pub fn align(
    obs: &Observations,
    preds: &Predictions,
    mismatched_allowed: bool,
    require_point_and_quantile: bool,
) -> Result<(Observations, Predictions)> {
    let retained;
    let preds = if require_point_and_quantile {
        retained = retain_point_and_quantile_keys(preds);
        &retained
    } else {
        preds
    };

    if mismatched_allowed {
        intersect(obs, preds)
    } else {
        check_keys_match(obs, preds)?;
        Ok((obs.clone(), preds.clone()))
    }
}

#[derive(Debug, Default)]
struct KeyForecast {
    point: Option<f64>,
    quantiles: Vec<(f64, f64)>,
}

impl KeyForecast {
    fn quantile(&self, q: f64) -> Option<f64> {
        self.quantiles
            .iter()
            .find(|(level, _)| quantile_eq(*level, q))
            .map(|&(_, v)| v)
    }
}

/// Prediction values laid out 1:1 with the observation rows.
#[derive(Debug)]
pub struct Alignment<'a> {
    obs: &'a Observations,
    forecasts: Vec<KeyForecast>,
}

impl<'a> Alignment<'a> {
    /// Checks that the keys match, then indexes `preds` by observation key.
    pub fn new(obs: &'a Observations, preds: &Predictions) -> Result<Self> {
        check_keys_match(obs, preds)?;
        Self::from_matched(obs, preds)
    }

    /// Indexes `preds` by observation key, for a pair that already went
    /// through [`align`].
    pub(crate) fn from_matched(obs: &'a Observations, preds: &Predictions) -> Result<Self> {
        let positions = projection(obs, preds)?;

        let mut by_key: BTreeMap<Key, KeyForecast> = BTreeMap::new();
        for row in preds.rows() {
            let key = row.key.project(&positions);
            let entry = by_key.entry(key).or_default();
            match row.kind {
                PredictionType::Point => {
                    if entry.point.replace(row.value).is_some() {
                        return Err(duplicate_after_projection(&row.key, "point"));
                    }
                }
                PredictionType::Quantile => {
                    let Some(q) = row.quantile else { continue };
                    if entry.quantile(q).is_some() {
                        return Err(duplicate_after_projection(&row.key, &format!("quantile {}", q)));
                    }
                    entry.quantiles.push((q, row.value));
                }
            }
        }

        let forecasts = obs
            .keys()
            .map(|k| by_key.remove(k).unwrap_or_default())
            .collect();

        Ok(Self { obs, forecasts })
    }

    pub fn observations(&self) -> &Observations {
        self.obs
    }

    pub fn len(&self) -> usize {
        self.forecasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forecasts.is_empty()
    }

    /// Values at quantile `q` for every observation key.
    pub fn quantile_column(&self, q: f64) -> Result<Vec<f64>> {
        self.obs
            .keys()
            .zip(&self.forecasts)
            .map(|(key, f)| {
                f.quantile(q).ok_or_else(|| ScoreError::MissingQuantile {
                    quantile: q,
                    key: key.to_string(),
                })
            })
            .collect()
    }

    /// Median values; [`ScoreError::MissingMedian`] when no key has one.
    pub fn median_column(&self) -> Result<Vec<f64>> {
        if !self.forecasts.iter().any(|f| f.quantile(0.5).is_some()) {
            return Err(ScoreError::MissingMedian);
        }
        self.quantile_column(0.5)
    }

    /// Point values, the median standing in where a key has no point row.
    /// Also returns how many keys used the median.
    pub fn point_column(&self, median: &[f64]) -> (Vec<f64>, usize) {
        let mut substituted = 0;
        let values = self
            .forecasts
            .iter()
            .zip(median)
            .map(|(f, &m)| {
                f.point.unwrap_or_else(|| {
                    substituted += 1;
                    m
                })
            })
            .collect();
        (values, substituted)
    }
}

fn duplicate_after_projection(key: &Key, what: &str) -> ScoreError {
    ScoreError::DuplicateKey(format!(
        "{} ({}) appears more than once after projection onto the observation columns; stratify on the extra prediction columns",
        key, what
    ))
}
