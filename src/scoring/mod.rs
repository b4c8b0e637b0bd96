//! Forecast scoring.
//!
//! This module computes interval scores and coverage for central prediction
//! intervals, combines them into the weighted interval score (WIS) per key
//! tuple, and aggregates the per-key scores into summaries, independently
//! for every stratum of the extra independent columns.

pub mod aggregate;
pub mod align;
pub mod functions;
pub mod stratify;
pub mod timestamped;
pub mod types;
pub mod utility;

pub use aggregate::{all_coverages, all_scores};
pub use align::{align, check_keys_match, intersect};
pub use functions::{IntervalScore, coverage, interval_score};
pub use stratify::{StratifiedEvaluation, score_stratified};
pub use timestamped::all_timestamped_scores;
pub use types::{Evaluation, IntervalParts, ScoreTable, ScoredRow, Summary, WisDecomposition};
