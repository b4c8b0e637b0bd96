use crate::config::ScoringConfig;
use crate::error::Result;
use crate::scoring::align::{Alignment, align, key_mismatch};
use crate::scoring::functions::coverage;
use crate::scoring::timestamped::{interval_quantiles, timestamped_scores};
use crate::scoring::types::{
    Evaluation, PartFractions, ScoreTable, Summary, WisDecomposition,
};
use crate::scoring::utility::{mean, ratio};
use crate::table::{Observations, Predictions};
use std::collections::BTreeMap;
use tracing::info;

/// Empirical coverage of every central interval, keyed by range.
pub fn all_coverages(
    obs: &Observations,
    preds: &Predictions,
    interval_ranges: &[u32],
) -> Result<BTreeMap<u32, f64>> {
    coverages(&Alignment::new(obs, preds)?, interval_ranges)
}

pub(crate) fn coverages(aligned: &Alignment, interval_ranges: &[u32]) -> Result<BTreeMap<u32, f64>> {
    let values = aligned.observations().values();

    let mut out = BTreeMap::new();
    for &range in interval_ranges {
        let (q_low, q_upp) = interval_quantiles(range);
        let cov = coverage(
            &values,
            &aligned.quantile_column(q_low)?,
            &aligned.quantile_column(q_upp)?,
        )?;
        out.insert(range, cov);
    }
    Ok(out)
}

/// Reduces a scored table and its coverages into a [`Summary`].
pub fn summarize(scores: &ScoreTable, coverage: BTreeMap<u32, f64>) -> Summary {
    let wis: Vec<f64> = scores
        .rows
        .iter()
        .filter_map(|r| r.wis)
        .filter(|w| !w.is_nan())
        .collect();
    let pae: Vec<f64> = scores.rows.iter().map(|r| r.point_absolute_error).collect();
    let mae: Vec<f64> = scores.rows.iter().map(|r| r.median_absolute_error).collect();

    let has_wis = !scores.interval_ranges.is_empty();
    let wis_total: f64 = wis.iter().sum();

    // without interval ranges every key carrying a median error was scored
    let nb_t_match = if has_wis {
        wis.len()
    } else {
        mae.iter().filter(|e| !e.is_nan()).count()
    };

    Summary {
        coverage,
        nb_t_match,
        wis_total: has_wis.then_some(wis_total),
        wis_mean: has_wis.then(|| mean(&wis)),
        point_absolute_error_total: pae.iter().sum(),
        point_absolute_error_mean: mean(&pae),
        median_absolute_error_total: mae.iter().sum(),
        median_absolute_error_mean: mean(&mae),
        wis_fractions: has_wis.then(|| wis_fractions(scores, wis_total)),
    }
}

/// Share of the total WIS due to dispersion, under- and overprediction.
///
/// The median term enters the WIS with weight 0.5; range `r` enters with
/// weight `0.5 * alpha_r`, both normalised by `K + 0.5`.
fn wis_fractions(scores: &ScoreTable, wis_total: f64) -> WisDecomposition {
    let k = scores.interval_ranges.len() as f64 + 0.5;
    let column_sum = |name: &str| -> f64 {
        scores
            .column(name)
            .map(|c| c.iter().sum())
            .unwrap_or(0.0)
    };

    let median_underprediction = ratio(
        0.5 * column_sum("median_absolute_error_underprediction"),
        k * wis_total,
    );
    let median_overprediction = ratio(
        0.5 * column_sum("median_absolute_error_overprediction"),
        k * wis_total,
    );

    let mut per_range = BTreeMap::new();
    for &range in &scores.interval_ranges {
        let alpha = 1.0 - f64::from(range) / 100.0;
        let norm = k / (0.5 * alpha);
        let part = |name: &str| ratio(column_sum(&format!("{}_{}", range, name)), norm * wis_total);
        per_range.insert(
            range,
            PartFractions {
                dispersion: part("dispersion"),
                underprediction: part("underprediction"),
                overprediction: part("overprediction"),
            },
        );
    }

    let mut total = PartFractions {
        dispersion: per_range.values().map(|p| p.dispersion).sum(),
        underprediction: per_range.values().map(|p| p.underprediction).sum(),
        overprediction: per_range.values().map(|p| p.overprediction).sum(),
    };
    total.underprediction += median_underprediction;
    total.overprediction += median_overprediction;

    WisDecomposition {
        median_underprediction,
        median_overprediction,
        per_range,
        total,
    }
}

/// Scores a pair whose keys already went through [`align`].
pub(crate) fn evaluate_aligned(
    obs: &Observations,
    preds: &Predictions,
    interval_ranges: &[u32],
) -> Result<Evaluation> {
    let aligned = Alignment::from_matched(obs, preds)?;
    let scores = timestamped_scores(&aligned, interval_ranges)?;
    let coverage = coverages(&aligned, interval_ranges)?;
    let summary = summarize(&scores, coverage);

    info!(
        nb_t_match = summary.nb_t_match,
        wis_mean = summary.wis_mean,
        "Scores computed"
    );

    Ok(Evaluation { summary, scores })
}

/// Scores one stratum: alignment, per-key scores, coverages and summary.
///
/// With mismatches allowed, inputs sharing no key fail with
/// [`ScoreError::KeyMismatch`](crate::ScoreError::KeyMismatch).
#[tracing::instrument(
    skip_all,
    fields(
        observations = obs.len(),
        predictions = preds.len(),
        ranges = config.interval_ranges.len(),
        mismatched_allowed = config.mismatched_allowed
    )
)]
pub fn all_scores(
    obs: &Observations,
    preds: &Predictions,
    config: &ScoringConfig,
) -> Result<Evaluation> {
    config.validate()?;
    let (aligned_obs, aligned_preds) = align(
        obs,
        preds,
        config.mismatched_allowed,
        config.require_point_and_quantile,
    )?;
    if config.mismatched_allowed && aligned_obs.is_empty() {
        return Err(key_mismatch(obs, preds)?);
    }

    evaluate_aligned(&aligned_obs, &aligned_preds, &config.interval_ranges)
}
