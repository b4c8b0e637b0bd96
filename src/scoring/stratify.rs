//! Independent scoring of every combination of stratifying column values.

use crate::config::ScoringConfig;
use crate::error::{Result, ScoreError};
use crate::scoring::aggregate::evaluate_aligned;
use crate::scoring::align::align;
use crate::scoring::types::{Evaluation, ScoreTable, ScoredRow};
use crate::table::{Observations, Predictions};
use std::collections::BTreeMap;
use tracing::{info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Results of a stratified run, keyed by the stratum's column values in
/// `strat_cols` order. A run with no stratifying column has a single
/// stratum keyed by the empty tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct StratifiedEvaluation {
    pub strat_cols: Vec<String>,
    pub strata: BTreeMap<Vec<String>, Evaluation>,
}

impl StratifiedEvaluation {
    pub fn len(&self) -> usize {
        self.strata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strata.is_empty()
    }

    /// Evaluation of the stratum with the given values.
    pub fn get(&self, values: &[&str]) -> Option<&Evaluation> {
        let key: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        self.strata.get(&key)
    }

    /// Summaries tagged with their stratum values.
    pub fn tagged_rows(&self) -> impl Iterator<Item = (BTreeMap<&str, &str>, &Evaluation)> {
        self.strata.iter().map(move |(values, eval)| {
            let tags = self
                .strat_cols
                .iter()
                .map(String::as_str)
                .zip(values.iter().map(String::as_str))
                .collect();
            (tags, eval)
        })
    }

    /// Every stratum's scored rows in a single table.
    ///
    /// Stratifying columns the observations do not carry are appended to
    /// the key, so rows from different strata stay distinguishable.
    pub fn combined_table(&self) -> Option<ScoreTable> {
        let first = &self.strata.values().next()?.scores;
        let extra: Vec<usize> = self
            .strat_cols
            .iter()
            .enumerate()
            .filter(|(_, c)| !first.other_ind_cols.contains(c))
            .map(|(i, _)| i)
            .collect();

        let mut other_ind_cols = first.other_ind_cols.clone();
        other_ind_cols.extend(extra.iter().map(|&i| self.strat_cols[i].clone()));

        let mut rows: Vec<ScoredRow> = Vec::new();
        for (values, eval) in &self.strata {
            rows.extend(eval.scores.rows.iter().map(|row| {
                let mut row = row.clone();
                row.key.others.extend(extra.iter().map(|&i| values[i].clone()));
                row
            }));
        }
        rows.sort_by(|a, b| a.key.cmp(&b.key));

        Some(ScoreTable {
            t_col: first.t_col.clone(),
            other_ind_cols,
            interval_ranges: first.interval_ranges.clone(),
            rows,
        })
    }
}

/// Cartesian product of the per-column value sets.
fn combinations(value_sets: &[Vec<String>]) -> Vec<Vec<String>> {
    value_sets.iter().fold(vec![Vec::new()], |acc, values| {
        acc.iter()
            .flat_map(|prefix| {
                values.iter().map(move |v| {
                    let mut combo = prefix.clone();
                    combo.push(v.clone());
                    combo
                })
            })
            .collect()
    })
}

fn score_stratum(
    obs: &Observations,
    preds: &Predictions,
    strat_cols: &[String],
    combo: &[String],
    config: &ScoringConfig,
) -> Result<Option<Evaluation>> {
    let mut obs_slice = obs.clone();
    let mut preds_slice = preds.clone();
    for (col, value) in strat_cols.iter().zip(combo) {
        obs_slice = obs_slice.select(col, value);
        preds_slice = preds_slice.select(col, value);
    }

    if preds_slice.is_empty() {
        return Ok(None);
    }
    let (obs_slice, preds_slice) = align(
        &obs_slice,
        &preds_slice,
        config.mismatched_allowed,
        config.require_point_and_quantile,
    )?;
    if config.mismatched_allowed && obs_slice.is_empty() {
        warn!(stratum = ?combo, "No shared key in stratum, skipping");
        return Ok(None);
    }

    evaluate_aligned(&obs_slice, &preds_slice, &config.interval_ranges).map(Some)
}

/// Scores every stratum independently.
///
/// Strata are the combinations of the values of `config.stratify_by`, or
/// of every extra prediction column when unset. Combinations without any
/// prediction are skipped.
#[tracing::instrument(skip_all, fields(observations = obs.len(), predictions = preds.len()))]
pub fn score_stratified(
    obs: &Observations,
    preds: &Predictions,
    config: &ScoringConfig,
) -> Result<StratifiedEvaluation> {
    config.validate()?;
    let strat_cols: Vec<String> = match &config.stratify_by {
        Some(cols) => cols.clone(),
        None => preds.other_ind_cols().to_vec(),
    };

    let value_sets = strat_cols
        .iter()
        .map(|col| {
            preds
                .column_values(col)
                .map(|set| set.into_iter().collect::<Vec<_>>())
                .ok_or_else(|| ScoreError::MissingColumn {
                    role: "stratify",
                    column: col.clone(),
                })
        })
        .collect::<Result<Vec<_>>>()?;
    let combos = combinations(&value_sets);

    info!(
        columns = ?strat_cols,
        combinations = combos.len(),
        "Scoring strata"
    );

    #[cfg(feature = "parallel")]
    let iter = combos.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iter = combos.iter();

    let scored = iter
        .map(|combo| {
            score_stratum(obs, preds, &strat_cols, combo, config)
                .map(|eval| eval.map(|e| (combo.clone(), e)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(StratifiedEvaluation {
        strat_cols,
        strata: scored.into_iter().flatten().collect(),
    })
}
