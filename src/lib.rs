//! Evaluation of probabilistic epidemic forecasts against observed outcomes.
//!
//! Observations and quantile/point predictions are loaded into sorted,
//! immutable record sets ([`table`]), aligned on their key tuples and scored
//! with the interval score, the weighted interval score and coverage
//! ([`scoring`]), independently for every stratum of the extra independent
//! columns. [`ensemble`] combines several prediction sets; [`hub`] pulls
//! forecast-hub files over HTTP.

pub mod config;
pub mod ensemble;
pub mod error;
pub mod fetch;
pub mod hub;
pub mod output;
pub mod scoring;
pub mod table;

pub use config::{DEFAULT_INTERVAL_RANGES, ScoringConfig};
pub use error::{Result, ScoreError};
