use crate::error::{Result, ScoreError};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Central interval ranges (in percent) scored when none are configured.
pub const DEFAULT_INTERVAL_RANGES: [u32; 11] = [10, 20, 30, 40, 50, 60, 70, 80, 90, 95, 98];

/// Options of a scoring run.
///
/// Stored as a JSON object on disk; missing fields take their defaults:
/// ```json
/// {
///   "interval_ranges": [50, 90],
///   "mismatched_allowed": true,
///   "stratify_by": ["location"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Central interval ranges, in percent. Empty means absolute errors only.
    pub interval_ranges: Vec<u32>,
    /// Score the key intersection instead of failing on mismatched keys.
    pub mismatched_allowed: bool,
    /// Drop keys that do not carry both a point and quantile predictions.
    pub require_point_and_quantile: bool,
    /// Columns to stratify on; `None` means every extra prediction column.
    pub stratify_by: Option<Vec<String>>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            interval_ranges: DEFAULT_INTERVAL_RANGES.to_vec(),
            mismatched_allowed: false,
            require_point_and_quantile: false,
            stratify_by: None,
        }
    }
}

impl ScoringConfig {
    /// Loads the config from a JSON file at `path`. Ranges come back sorted.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scoring config {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse scoring config {}", path.display()))?;
        config.interval_ranges.sort_unstable();
        config.validate()?;
        Ok(config)
    }

    /// Rejects ranges above 100 and ranges listed twice.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for &r in &self.interval_ranges {
            if r > 100 {
                return Err(ScoreError::IntervalRangeOutOfBounds(f64::from(r)));
            }
            if !seen.insert(r) {
                return Err(ScoreError::DuplicateIntervalRange(r));
            }
        }
        Ok(())
    }
}
