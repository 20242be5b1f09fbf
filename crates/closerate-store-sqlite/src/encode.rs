//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 with microsecond precision and a `Z`
//! suffix. Status enums are stored by their snake_case names.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use closerate_core::{
  call::{Call, Participant},
  lifecycle::{
    EventSnapshot, EventStatus, Override, OverrideStatus, SubscriptionSnapshot,
    SubscriptionStatus,
  },
  metrics::ManualClose,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Status enums ────────────────────────────────────────────────────────────

pub fn decode_status<T: FromStr>(kind: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| {
    Error::Core(closerate_core::Error::UnknownStatus {
      kind,
      value: s.to_owned(),
    })
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read from a `calls` row plus its participants.
pub struct RawCall {
  pub call_id:          String,
  pub title:            Option<String>,
  pub started_at:       String,
  pub rep:              String,
  pub duration_seconds: u32,
  pub matched_email:    Option<String>,
  /// `(name, email)` in position order.
  pub participants:     Vec<(Option<String>, Option<String>)>,
}

impl RawCall {
  pub fn into_call(self) -> Result<Call> {
    Ok(Call {
      id:               self.call_id,
      title:            self.title,
      datetime:         decode_dt(&self.started_at)?,
      rep:              self.rep,
      duration_seconds: self.duration_seconds,
      participants:     self
        .participants
        .into_iter()
        .map(|(name, email)| Participant { name, email })
        .collect(),
      matched_email:    self.matched_email,
    })
  }
}

pub struct RawOverride {
  pub call_id:    String,
  pub status:     String,
  pub notes:      Option<String>,
  pub updated_at: String,
}

impl RawOverride {
  pub fn into_override(self) -> Result<Override> {
    Ok(Override {
      status:     decode_status::<OverrideStatus>("override", &self.status)?,
      updated_at: decode_dt(&self.updated_at)?,
      call_id:    self.call_id,
      notes:      self.notes,
    })
  }
}

pub struct RawSubscription {
  pub matched:     bool,
  pub status:      String,
  pub signup_date: Option<String>,
}

impl RawSubscription {
  pub fn into_snapshot(self) -> Result<SubscriptionSnapshot> {
    Ok(SubscriptionSnapshot {
      matched:     self.matched,
      status:      decode_status::<SubscriptionStatus>("subscription", &self.status)?,
      signup_date: self.signup_date.as_deref().map(decode_dt).transpose()?,
    })
  }
}

pub struct RawEvent {
  pub status:      String,
  pub occurred_at: String,
}

impl RawEvent {
  pub fn into_snapshot(self) -> Result<EventSnapshot> {
    Ok(EventSnapshot {
      status:    decode_status::<EventStatus>("event", &self.status)?,
      timestamp: decode_dt(&self.occurred_at)?,
    })
  }
}

pub struct RawManualClose {
  pub close_id:       String,
  pub rep:            String,
  pub closed_at:      String,
  pub prospect_email: Option<String>,
  pub notes:          Option<String>,
}

impl RawManualClose {
  pub fn into_manual_close(self) -> Result<ManualClose> {
    Ok(ManualClose {
      id:             self.close_id,
      rep:            self.rep,
      closed_at:      decode_dt(&self.closed_at)?,
      prospect_email: self.prospect_email,
      notes:          self.notes,
    })
  }
}
