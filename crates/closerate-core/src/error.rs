//! Error types for `closerate-core`.
//!
//! Only request validation is a hard failure. Missing snapshots, absent
//! overrides and ambiguous titles are ordinary values, not errors.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("a start and end date are required")]
  MissingDateRange,

  #[error("start {start} is after end {end}")]
  InvalidDateRange {
    start: DateTime<Utc>,
    end:   DateTime<Utc>,
  },

  #[error("unknown {kind} status: {value:?}")]
  UnknownStatus { kind: &'static str, value: String },

  #[error("invalid classifier pattern: {0}")]
  InvalidPattern(#[from] regex::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
