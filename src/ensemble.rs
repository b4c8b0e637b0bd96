//! Combination of several prediction sets into one.

use crate::error::{Result, ScoreError};
use crate::scoring::utility::median;
use crate::table::predictions::row_order;
use crate::table::{PredictionRow, PredictionType, Predictions, quantile_eq};
use tracing::debug;

/// Groups the rows of every set by (key, type, quantile) and reduces each
/// group's values with `reduce`, which also receives the group's quantile.
fn combine<F>(sets: &[Predictions], reduce: F) -> Result<Predictions>
where
    F: Fn(Option<f64>, &[f64]) -> f64,
{
    let first = sets
        .first()
        .ok_or_else(|| ScoreError::EmptyEnsemble("no prediction set given".to_string()))?;
    let cols = first.other_ind_cols();
    if let Some(other) = sets.iter().find(|s| s.other_ind_cols() != cols) {
        return Err(ScoreError::EmptyEnsemble(format!(
            "independent columns differ: [{}] vs [{}]",
            cols.join(","),
            other.other_ind_cols().join(",")
        )));
    }

    let mut rows: Vec<&PredictionRow> = sets.iter().flat_map(|s| s.rows()).collect();
    rows.sort_by(|a, b| row_order(a, b));

    let same_group = |a: &PredictionRow, b: &PredictionRow| {
        a.key == b.key
            && a.kind == b.kind
            && match (a.quantile, b.quantile) {
                (Some(x), Some(y)) => quantile_eq(x, y),
                (x, y) => x.is_none() && y.is_none(),
            }
    };

    let mut out = Vec::new();
    let mut start = 0;
    while start < rows.len() {
        let head = rows[start];
        let end = start
            + rows[start..]
                .iter()
                .take_while(|r| same_group(head, r))
                .count();
        let values: Vec<f64> = rows[start..end].iter().map(|r| r.value).collect();
        out.push(PredictionRow {
            key: head.key.clone(),
            kind: head.kind,
            quantile: head.quantile,
            value: reduce(head.quantile.filter(|_| head.kind == PredictionType::Quantile), &values),
        });
        start = end;
    }

    debug!(sets = sets.len(), rows = out.len(), "Ensemble built");
    Predictions::new(cols.to_vec(), out)
}

/// Per-group median of the member values.
pub fn median_ensemble(sets: &[Predictions]) -> Result<Predictions> {
    combine(sets, |_, values| median(values))
}

/// Widest envelope of the members: minimum below the median quantile,
/// maximum above it, median at 0.5 and for point rows.
pub fn extreme_ensemble(sets: &[Predictions]) -> Result<Predictions> {
    combine(sets, |quantile, values| match quantile {
        Some(q) if quantile_eq(q, 0.5) => median(values),
        Some(q) if q < 0.5 => values.iter().copied().fold(f64::INFINITY, f64::min),
        Some(_) => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        None => median(values),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Key;
    use chrono::NaiveDate;

    fn k() -> Key {
        Key::at(NaiveDate::from_ymd_opt(2020, 5, 2).unwrap())
    }

    fn member(lo: f64, mid: f64, hi: f64, point: f64) -> Predictions {
        Predictions::new(
            vec![],
            vec![
                PredictionRow::quantile(k(), 0.25, lo),
                PredictionRow::quantile(k(), 0.5, mid),
                PredictionRow::quantile(k(), 0.75, hi),
                PredictionRow::point(k(), point),
            ],
        )
        .unwrap()
    }

    fn members() -> Vec<Predictions> {
        vec![
            member(1.0, 5.0, 9.0, 4.0),
            member(2.0, 6.0, 7.0, 6.0),
            member(0.0, 10.0, 8.0, 11.0),
        ]
    }

    fn value(p: &Predictions, q: Option<f64>) -> f64 {
        p.rows()
            .iter()
            .find(|r| match q {
                Some(q) => r.is_quantile(q),
                None => r.kind == PredictionType::Point,
            })
            .unwrap()
            .value
    }

    #[test]
    fn test_median_ensemble() {
        let ens = median_ensemble(&members()).unwrap();
        assert_eq!(ens.len(), 4);
        assert_eq!(value(&ens, Some(0.25)), 1.0);
        assert_eq!(value(&ens, Some(0.5)), 6.0);
        assert_eq!(value(&ens, Some(0.75)), 8.0);
        assert_eq!(value(&ens, None), 6.0);
    }

    #[test]
    fn test_extreme_ensemble() {
        let ens = extreme_ensemble(&members()).unwrap();
        assert_eq!(value(&ens, Some(0.25)), 0.0);
        assert_eq!(value(&ens, Some(0.5)), 6.0);
        assert_eq!(value(&ens, Some(0.75)), 9.0);
        assert_eq!(value(&ens, None), 6.0);
    }

    #[test]
    fn test_quantiles_grouped_within_tolerance() {
        let a = Predictions::new(vec![], vec![PredictionRow::quantile(k(), 0.1, 1.0)]).unwrap();
        let b = Predictions::new(
            vec![],
            vec![PredictionRow::quantile(k(), 0.5 - 40.0 / 100.0, 3.0)],
        )
        .unwrap();
        let ens = median_ensemble(&[a, b]).unwrap();
        assert_eq!(ens.len(), 1);
        assert_eq!(ens.rows()[0].value, 2.0);
    }

    #[test]
    fn test_empty_or_incompatible_input() {
        assert!(matches!(median_ensemble(&[]), Err(ScoreError::EmptyEnsemble(_))));

        let located = Predictions::new(
            vec!["location".into()],
            vec![PredictionRow::quantile(
                Key::new(k().t, vec!["US".into()]),
                0.5,
                1.0,
            )],
        )
        .unwrap();
        assert!(matches!(
            extreme_ensemble(&[member(1.0, 2.0, 3.0, 2.0), located]),
            Err(ScoreError::EmptyEnsemble(_))
        ));
    }
}
