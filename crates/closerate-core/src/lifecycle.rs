//! Lifecycle signals and their resolution into one status per call.
//!
//! Three independent inputs can say something about whether a prospect
//! closed: an analyst's manual override, the subscription billing system,
//! and lifecycle events parsed from messages. [`resolve`] applies them in a
//! fixed priority order (override, then subscription, then event log) and reports
//! which one decided.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::call::Call;

// ─── Manual overrides ────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OverrideStatus {
  SignedUp,
  Active,
  Churned,
  /// The "prospect" turned out to be a colleague or existing team member.
  Team,
  NoClose,
}

/// An analyst's correction for one call. At most one exists per call; a
/// later write replaces the earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
  pub call_id:    String,
  pub status:     OverrideStatus,
  pub notes:      Option<String>,
  pub updated_at: DateTime<Utc>,
}

// ─── Subscription source ─────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
  Active,
  Trialing,
  PastDue,
  Canceled,
  Unmatched,
}

/// Billing-system view of a prospect, as cached by the enrichment job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
  pub matched:     bool,
  pub status:      SubscriptionStatus,
  pub signup_date: Option<DateTime<Utc>>,
}

impl SubscriptionSnapshot {
  /// An affirmative match, independent of current standing.
  pub fn is_signed_up(&self) -> bool {
    self.matched && self.status != SubscriptionStatus::Unmatched
  }
}

// ─── Event-log source ────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventStatus {
  Registered,
  Active,
  Canceled,
  Unparsed,
}

/// The latest lifecycle event parsed for a prospect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSnapshot {
  pub status:    EventStatus,
  pub timestamp: DateTime<Utc>,
}

impl EventSnapshot {
  pub fn is_signed_up(&self) -> bool { self.status != EventStatus::Unparsed }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Which input decided a [`ResolvedStatus`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Source {
  Manual,
  Subscription,
  Eventlog,
  None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvePolicy {
  pub use_manual_overrides: bool,
}

/// The signals available for one call, strongest first. Resolution takes
/// the first one that affirms a relationship.
#[derive(Debug, Clone, Copy)]
pub enum Signal<'a> {
  Manual(&'a Override),
  Subscription(&'a SubscriptionSnapshot),
  EventLog(&'a EventSnapshot),
}

impl Signal<'_> {
  fn source(&self) -> Source {
    match self {
      Self::Manual(_) => Source::Manual,
      Self::Subscription(_) => Source::Subscription,
      Self::EventLog(_) => Source::Eventlog,
    }
  }

  /// Overrides always decide. Automated sources only decide when they
  /// report a signup; a non-affirmative record defers to the next source.
  fn decides(&self) -> bool {
    match self {
      Self::Manual(_) => true,
      Self::Subscription(s) => s.is_signed_up(),
      Self::EventLog(e) => e.is_signed_up(),
    }
  }

  fn into_status(self, call: &Call) -> ResolvedStatus {
    let source = self.source();
    match self {
      Self::Manual(o) => {
        let status = o.status;
        ResolvedStatus {
          is_signed_up: matches!(
            status,
            OverrideStatus::SignedUp | OverrideStatus::Active | OverrideStatus::Churned
          ),
          is_active: status == OverrideStatus::Active,
          is_churned: status == OverrideStatus::Churned,
          is_team: status == OverrideStatus::Team,
          is_no_close: status == OverrideStatus::NoClose,
          source,
          raw_status: status.to_string(),
          signup_date: None,
          days_to_signup: None,
        }
      }
      Self::Subscription(s) => ResolvedStatus {
        is_signed_up: true,
        is_active: s.status == SubscriptionStatus::Active,
        is_churned: s.status == SubscriptionStatus::Canceled,
        source,
        raw_status: s.status.to_string(),
        signup_date: s.signup_date,
        days_to_signup: s.signup_date.and_then(|d| days_between(call.datetime, d)),
        ..ResolvedStatus::unmatched()
      },
      Self::EventLog(e) => ResolvedStatus {
        is_signed_up: true,
        is_active: e.status == EventStatus::Active,
        is_churned: e.status == EventStatus::Canceled,
        source,
        raw_status: e.status.to_string(),
        signup_date: Some(e.timestamp),
        days_to_signup: days_between(call.datetime, e.timestamp),
        ..ResolvedStatus::unmatched()
      },
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedStatus {
  pub is_signed_up:   bool,
  pub is_active:      bool,
  pub is_churned:     bool,
  pub is_team:        bool,
  pub is_no_close:    bool,
  pub source:         Source,
  /// The deciding input's own status string, for auditing.
  pub raw_status:     String,
  pub signup_date:    Option<DateTime<Utc>>,
  /// Calendar days (UTC) from the call to the signup. `None` when there is
  /// no date or the signup day predates the call day.
  pub days_to_signup: Option<i64>,
}

impl ResolvedStatus {
  pub fn unmatched() -> Self {
    Self {
      is_signed_up:   false,
      is_active:      false,
      is_churned:     false,
      is_team:        false,
      is_no_close:    false,
      source:         Source::None,
      raw_status:     SubscriptionStatus::Unmatched.to_string(),
      signup_date:    None,
      days_to_signup: None,
    }
  }

  /// Single human-readable outcome for audit rows.
  pub fn label(&self) -> &'static str {
    if self.is_team {
      "team"
    } else if self.is_no_close {
      "no_close"
    } else if self.is_churned {
      "churned"
    } else if self.is_active {
      "active"
    } else if self.is_signed_up {
      "signed_up"
    } else {
      "unmatched"
    }
  }
}

/// Resolve one call's lifecycle status.
///
/// The override is only consulted when `policy.use_manual_overrides` is set.
/// Missing inputs are simply skipped; the result is never an error.
pub fn resolve(
  call: &Call,
  override_: Option<&Override>,
  subscription: Option<&SubscriptionSnapshot>,
  event: Option<&EventSnapshot>,
  policy: ResolvePolicy,
) -> ResolvedStatus {
  let signals = [
    override_
      .filter(|_| policy.use_manual_overrides)
      .map(Signal::Manual),
    subscription.map(Signal::Subscription),
    event.map(Signal::EventLog),
  ];

  signals
    .into_iter()
    .flatten()
    .find(Signal::decides)
    .map(|signal| signal.into_status(call))
    .unwrap_or_else(ResolvedStatus::unmatched)
}

/// Calendar days from `from` to `to`, or `None` if `to` falls on an
/// earlier day. Time of day is ignored: signup dates are often date-only.
fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Option<i64> {
  let days = (to.date_naive() - from.date_naive()).num_days();
  (days >= 0).then_some(days)
}
