//! Call records and the reporting window they are analysed in.
//!
//! Calls are created and soft-deleted by the external call repository; this
//! crate only ever reads them.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result};

// ─── Call ────────────────────────────────────────────────────────────────────

/// Somebody who attended a call. The email is optional because recorders
/// frequently only capture a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
  pub name:  Option<String>,
  pub email: Option<String>,
}

impl Participant {
  pub fn with_email(email: impl Into<String>) -> Self {
    Self { name: None, email: Some(email.into()) }
  }
}

/// A recorded call. Immutable input to the metrics pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
  pub id:               String,
  /// Free-text title as entered in the calendar or recorder.
  pub title:            Option<String>,
  pub datetime:         DateTime<Utc>,
  /// Rep identifier, usually the host's email address.
  pub rep:              String,
  pub duration_seconds: u32,
  pub participants:     Vec<Participant>,
  /// Prospect email confirmed by an earlier enrichment match, if any. Takes
  /// precedence over participant scanning when deriving the prospect key.
  #[serde(default)]
  pub matched_email:    Option<String>,
}

// ─── DateRange ───────────────────────────────────────────────────────────────

/// An inclusive UTC reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>,
}

impl DateRange {
  pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
    if start > end {
      return Err(Error::InvalidDateRange { start, end });
    }
    Ok(Self { start, end })
  }

  /// Build a range from optional bounds, as received from a request.
  /// Either bound missing is a validation failure.
  pub fn from_bounds(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
  ) -> Result<Self> {
    match (start, end) {
      (Some(start), Some(end)) => Self::new(start, end),
      _ => Err(Error::MissingDateRange),
    }
  }

  /// The range covered by `period`, ending at `now`.
  pub fn for_period(period: Period, now: DateTime<Utc>) -> Self {
    let start = match period {
      Period::Today => now.date_naive().and_time(NaiveTime::MIN).and_utc(),
      other => now - Duration::days(other.days_back()),
    };
    Self { start, end: now }
  }
}

/// Named reporting windows offered by the dashboards.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Period {
  Today,
  LastWeek,
  LastMonth,
  #[serde(rename = "last_3_months")]
  #[strum(serialize = "last_3_months")]
  Last3Months,
}

impl Period {
  pub fn days_back(self) -> i64 {
    match self {
      Self::Today => 0,
      Self::LastWeek => 7,
      Self::LastMonth => 30,
      Self::Last3Months => 90,
    }
  }
}
