//! Closing-rate metrics over a set of calls.
//!
//! Pipeline: classify → drop non-sales → drop excluded → dedupe → resolve
//! each survivor → aggregate. Every step reads only the inputs it is handed;
//! missing snapshots count as "unmatched", never as errors.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  call::{Call, DateRange},
  classify::{Classification, Classifier},
  dedupe::{Deduplicator, ProspectCall},
  lifecycle::{
    EventSnapshot, Override, ResolvePolicy, ResolvedStatus, Source,
    SubscriptionSnapshot, resolve,
  },
  prospect::ProspectKey,
};

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Toggles for one metrics computation. All default to off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsOptions {
  pub use_manual_overrides:   bool,
  pub include_manual_closes:  bool,
  pub include_excluded_calls: bool,
}

impl MetricsOptions {
  pub fn policy(&self) -> ResolvePolicy {
    ResolvePolicy { use_manual_overrides: self.use_manual_overrides }
  }
}

/// A deal an analyst recorded by hand, independent of any analysed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualClose {
  pub id:             String,
  pub rep:            String,
  pub closed_at:      DateTime<Utc>,
  pub prospect_email: Option<String>,
  pub notes:          Option<String>,
}

/// Everything a computation reads. Lookup maps may be partial.
#[derive(Debug, Clone, Default)]
pub struct MetricsInput {
  pub calls:         Vec<Call>,
  /// Keyed by call id.
  pub overrides:     HashMap<String, Override>,
  pub subscriptions: HashMap<ProspectKey, SubscriptionSnapshot>,
  pub events:        HashMap<ProspectKey, EventSnapshot>,
  pub excluded:      HashSet<String>,
  pub manual_closes: Vec<ManualClose>,
}

// ─── Outputs ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
  Call,
  ManualClose,
}

/// One line of the audit trail behind the aggregate numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRow {
  pub kind:           RowKind,
  pub id:             String,
  pub title:          Option<String>,
  pub date:           DateTime<Utc>,
  pub rep:            String,
  pub prospect:       Option<String>,
  /// Resolved outcome, e.g. `active` or `unmatched`.
  pub label:          String,
  pub source:         Source,
  pub raw_status:     String,
  pub is_override:    bool,
  pub days_to_signup: Option<i64>,
}

/// A fresh, unpersisted snapshot of one computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsResult {
  pub rep:                Option<String>,
  pub range:              Option<DateRange>,
  pub options:            MetricsOptions,

  /// Calls handed in, before classification.
  pub raw_call_count:     usize,
  /// Calls classified `SALES`.
  pub sales_call_count:   usize,
  /// Sales calls dropped because they are on the exclusion list.
  pub excluded_count:     usize,
  /// Calls left after deduplication.
  pub deduped_count:      usize,

  pub call_count:         usize,
  pub signup_count:       usize,
  pub active_count:       usize,
  pub churned_count:      usize,
  pub team_count:         usize,
  pub no_close_count:     usize,
  pub manual_close_count: usize,

  /// Percent of calls that signed up.
  pub signup_rate:        u32,
  /// Percent of calls that are currently active.
  pub active_rate:        u32,
  /// Percent of signups that churned.
  pub churned_rate:       u32,
  pub avg_days_to_signup: Option<i64>,

  pub rows:               Vec<AuditRow>,
}

impl MetricsResult {
  /// Attach the request this result answers.
  pub fn for_request(mut self, rep: Option<String>, range: DateRange) -> Self {
    self.rep = rep;
    self.range = Some(range);
    self
  }
}

/// The call set that survives classification, exclusion and deduplication.
#[derive(Debug, Clone)]
pub struct Plan {
  pub raw_call_count:   usize,
  pub sales_call_count: usize,
  pub excluded_count:   usize,
  pub prospects:        Vec<ProspectCall>,
}

impl Plan {
  /// Prospect keys worth looking up in the lifecycle sources.
  pub fn lookup_keys(&self) -> impl Iterator<Item = &ProspectKey> {
    self.prospects.iter().map(|pc| &pc.key).filter(|k| !k.is_synthetic())
  }
}

// ─── Calculator ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MetricsCalculator {
  classifier:   Classifier,
  deduplicator: Deduplicator,
}

impl MetricsCalculator {
  pub fn new(classifier: Classifier, deduplicator: Deduplicator) -> Self {
    Self { classifier, deduplicator }
  }

  pub fn classifier(&self) -> &Classifier { &self.classifier }

  pub fn classify_call(&self, call: &Call) -> Classification {
    self.classifier.classify(call.title.as_deref())
  }

  /// Classify, filter and dedupe, without resolving anything.
  pub fn plan(
    &self,
    calls: &[Call],
    excluded: &HashSet<String>,
    options: MetricsOptions,
  ) -> Plan {
    let sales: Vec<&Call> = calls
      .iter()
      .filter(|call| self.classify_call(call).is_sales())
      .collect();

    let (kept, dropped): (Vec<&Call>, Vec<&Call>) = sales
      .iter()
      .copied()
      .partition(|call| options.include_excluded_calls || !excluded.contains(&call.id));

    let prospects = self.deduplicator.dedupe_keyed(kept.into_iter().cloned());

    Plan {
      raw_call_count: calls.len(),
      sales_call_count: sales.len(),
      excluded_count: dropped.len(),
      prospects,
    }
  }

  /// Compute metrics over `input`. Infallible: absent overrides and
  /// snapshots resolve to "unmatched".
  pub fn compute_metrics(
    &self,
    input: &MetricsInput,
    options: MetricsOptions,
  ) -> MetricsResult {
    let plan = self.plan(&input.calls, &input.excluded, options);
    let policy = options.policy();

    let mut tally = Tally::default();
    let mut rows = Vec::with_capacity(plan.prospects.len());

    for ProspectCall { key, call } in &plan.prospects {
      let override_ = input.overrides.get(&call.id);
      let status = resolve(
        call,
        override_,
        input.subscriptions.get(key),
        input.events.get(key),
        policy,
      );
      tracing::debug!(
        call = %call.id,
        prospect = %key,
        source = %status.source,
        label = status.label(),
        "resolved call"
      );

      tally.add(&status);
      rows.push(AuditRow {
        kind:           RowKind::Call,
        id:             call.id.clone(),
        title:          call.title.clone(),
        date:           call.datetime,
        rep:            call.rep.clone(),
        prospect:       key.email().map(str::to_owned),
        label:          status.label().to_owned(),
        source:         status.source,
        raw_status:     status.raw_status.clone(),
        is_override:    status.source == Source::Manual,
        days_to_signup: status.days_to_signup,
      });
    }

    let mut manual_close_count = 0;
    if options.include_manual_closes {
      for close in &input.manual_closes {
        manual_close_count += 1;
        rows.push(AuditRow {
          kind:           RowKind::ManualClose,
          id:             close.id.clone(),
          title:          close.notes.clone(),
          date:           close.closed_at,
          rep:            close.rep.clone(),
          prospect:       close.prospect_email.clone(),
          label:          "signed_up".to_owned(),
          source:         Source::Manual,
          raw_status:     "manual_close".to_owned(),
          is_override:    false,
          days_to_signup: None,
        });
      }
    }

    let signup_count = tally.signups + manual_close_count;
    let result = MetricsResult {
      rep: None,
      range: None,
      options,
      raw_call_count: plan.raw_call_count,
      sales_call_count: plan.sales_call_count,
      excluded_count: plan.excluded_count,
      deduped_count: plan.prospects.len(),
      call_count: tally.calls,
      signup_count,
      active_count: tally.active,
      churned_count: tally.churned,
      team_count: tally.team,
      no_close_count: tally.no_close,
      manual_close_count,
      signup_rate: percent(signup_count, tally.calls),
      active_rate: percent(tally.active, tally.calls),
      churned_rate: percent(tally.churned, signup_count),
      avg_days_to_signup: rounded_mean(&tally.lag_samples),
      rows,
    };

    tracing::info!(
      raw = result.raw_call_count,
      sales = result.sales_call_count,
      deduped = result.deduped_count,
      signups = result.signup_count,
      signup_rate = result.signup_rate,
      "computed metrics"
    );
    result
  }
}

#[derive(Debug, Default)]
struct Tally {
  calls:       usize,
  signups:     usize,
  active:      usize,
  churned:     usize,
  team:        usize,
  no_close:    usize,
  lag_samples: Vec<i64>,
}

impl Tally {
  fn add(&mut self, status: &ResolvedStatus) {
    self.calls += 1;
    self.signups += usize::from(status.is_signed_up);
    self.active += usize::from(status.is_active);
    self.churned += usize::from(status.is_churned);
    self.team += usize::from(status.is_team);
    self.no_close += usize::from(status.is_no_close);
    if let Some(days) = status.days_to_signup.filter(|d| *d >= 0) {
      self.lag_samples.push(days);
    }
  }
}

/// `round(part / whole * 100)`, or 0 when `whole` is 0.
pub fn percent(part: usize, whole: usize) -> u32 {
  if whole == 0 {
    return 0;
  }
  (part as f64 / whole as f64 * 100.0).round() as u32
}

fn rounded_mean(samples: &[i64]) -> Option<i64> {
  if samples.is_empty() {
    return None;
  }
  let sum: i64 = samples.iter().sum();
  Some((sum as f64 / samples.len() as f64).round() as i64)
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::{
    call::Participant,
    lifecycle::{EventStatus, OverrideStatus, SubscriptionStatus},
    prospect::InternalDirectory,
  };

  fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, 9, 0, 0).unwrap()
  }

  fn call(id: &str, title: &str, d: u32, email: &str) -> Call {
    Call {
      id:               id.into(),
      title:            Some(title.into()),
      datetime:         day(d),
      rep:              "rep@acme.io".into(),
      duration_seconds: 1800,
      participants:     vec![
        Participant::with_email("rep@acme.io"),
        Participant::with_email(email),
      ],
      matched_email:    None,
    }
  }

  fn key(email: &str) -> ProspectKey { ProspectKey::from_email(email).unwrap() }

  fn calculator() -> MetricsCalculator {
    MetricsCalculator::new(
      Classifier::default(),
      Deduplicator::new(InternalDirectory::new(["acme.io"], Vec::<String>::new())),
    )
  }

  #[test]
  fn empty_input_yields_zero_rates() {
    let r = calculator().compute_metrics(&MetricsInput::default(), MetricsOptions::default());
    assert_eq!(r.call_count, 0);
    assert_eq!(r.signup_rate, 0);
    assert_eq!(r.active_rate, 0);
    assert_eq!(r.churned_rate, 0);
    assert_eq!(r.avg_days_to_signup, None);
    assert!(r.rows.is_empty());
  }

  #[test]
  fn three_calls_one_prospect_end_to_end() {
    let input = MetricsInput {
      calls: vec![
        call("jan-10", "Discovery call", 10, "pat@lead.com"),
        call("jan-01", "Discovery call", 1, "pat@lead.com"),
        call("jan-05", "Proposal review", 5, "pat@lead.com"),
      ],
      subscriptions: HashMap::from([(
        key("pat@lead.com"),
        SubscriptionSnapshot {
          matched:     true,
          status:      SubscriptionStatus::Active,
          signup_date: Some(day(8)),
        },
      )]),
      ..MetricsInput::default()
    };

    let r = calculator().compute_metrics(&input, MetricsOptions::default());
    assert_eq!(r.raw_call_count, 3);
    assert_eq!(r.deduped_count, 1);
    assert_eq!(r.call_count, 1);
    assert_eq!(r.signup_count, 1);
    assert_eq!(r.active_count, 1);
    assert_eq!(r.signup_rate, 100);
    assert_eq!(r.active_rate, 100);
    assert_eq!(r.avg_days_to_signup, Some(7));

    let row = &r.rows[0];
    assert_eq!(row.id, "jan-01");
    assert_eq!(row.source, Source::Subscription);
    assert_eq!(row.label, "active");
    assert_eq!(row.days_to_signup, Some(7));
  }

  #[test]
  fn afternoon_call_with_date_only_signup() {
    let mut first = call("jan-01", "Discovery call", 1, "pat@lead.com");
    first.datetime = Utc.with_ymd_and_hms(2024, 1, 1, 14, 30, 0).unwrap();
    let input = MetricsInput {
      calls: vec![first, call("jan-05", "Proposal review", 5, "pat@lead.com")],
      subscriptions: HashMap::from([(
        key("pat@lead.com"),
        SubscriptionSnapshot {
          matched:     true,
          status:      SubscriptionStatus::Active,
          signup_date: Some(Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap()),
        },
      )]),
      ..MetricsInput::default()
    };

    let r = calculator().compute_metrics(&input, MetricsOptions::default());
    assert_eq!(r.call_count, 1);
    assert_eq!(r.avg_days_to_signup, Some(7));
    assert_eq!(r.rows[0].days_to_signup, Some(7));
  }

  #[test]
  fn non_sales_calls_are_ignored() {
    let input = MetricsInput {
      calls: vec![
        call("a", "Weekly standup", 1, "x@lead.com"),
        call("b", "Jan 23, 12:12 PM", 2, "y@lead.com"),
        call("c", "Demo", 3, "z@lead.com"),
      ],
      ..MetricsInput::default()
    };
    let r = calculator().compute_metrics(&input, MetricsOptions::default());
    assert_eq!(r.raw_call_count, 3);
    assert_eq!(r.sales_call_count, 1);
    assert_eq!(r.call_count, 1);
  }

  #[test]
  fn exclusions_respect_toggle() {
    let input = MetricsInput {
      calls: vec![
        call("a", "Demo", 1, "x@lead.com"),
        call("b", "Demo", 2, "y@lead.com"),
      ],
      excluded: HashSet::from(["a".to_owned()]),
      ..MetricsInput::default()
    };

    let r = calculator().compute_metrics(&input, MetricsOptions::default());
    assert_eq!(r.excluded_count, 1);
    assert_eq!(r.call_count, 1);

    let options = MetricsOptions { include_excluded_calls: true, ..Default::default() };
    let r = calculator().compute_metrics(&input, options);
    assert_eq!(r.excluded_count, 0);
    assert_eq!(r.call_count, 2);
  }

  #[test]
  fn churn_rate_is_relative_to_signups() {
    let subs = [
      ("a@lead.com", SubscriptionStatus::Active),
      ("b@lead.com", SubscriptionStatus::Canceled),
      ("c@lead.com", SubscriptionStatus::Canceled),
    ];
    let input = MetricsInput {
      calls: vec![
        call("a", "Demo", 1, "a@lead.com"),
        call("b", "Demo", 1, "b@lead.com"),
        call("c", "Demo", 1, "c@lead.com"),
        call("d", "Demo", 1, "d@lead.com"),
      ],
      subscriptions: subs
        .into_iter()
        .map(|(email, status)| {
          (key(email), SubscriptionSnapshot { matched: true, status, signup_date: None })
        })
        .collect(),
      ..MetricsInput::default()
    };

    let r = calculator().compute_metrics(&input, MetricsOptions::default());
    assert_eq!(r.call_count, 4);
    assert_eq!(r.signup_count, 3);
    assert_eq!(r.signup_rate, 75);
    assert_eq!(r.active_rate, 25);
    assert_eq!(r.churned_rate, 67);
    assert_eq!(r.avg_days_to_signup, None);
  }

  #[test]
  fn negative_lags_are_excluded_from_average() {
    let input = MetricsInput {
      calls: vec![
        call("a", "Demo", 10, "a@lead.com"),
        call("b", "Demo", 1, "b@lead.com"),
      ],
      events: HashMap::from([
        (key("a@lead.com"), EventSnapshot { status: EventStatus::Registered, timestamp: day(2) }),
        (key("b@lead.com"), EventSnapshot { status: EventStatus::Active, timestamp: day(5) }),
      ]),
      ..MetricsInput::default()
    };
    let r = calculator().compute_metrics(&input, MetricsOptions::default());
    assert_eq!(r.signup_count, 2);
    assert_eq!(r.avg_days_to_signup, Some(4));
  }

  #[test]
  fn overrides_only_apply_when_enabled() {
    let input = MetricsInput {
      calls: vec![call("a", "Demo", 1, "a@lead.com")],
      overrides: HashMap::from([(
        "a".to_owned(),
        Override {
          call_id:    "a".into(),
          status:     OverrideStatus::Active,
          notes:      Some("confirmed by finance".into()),
          updated_at: day(3),
        },
      )]),
      ..MetricsInput::default()
    };

    let r = calculator().compute_metrics(&input, MetricsOptions::default());
    assert_eq!(r.signup_count, 0);
    assert!(!r.rows[0].is_override);

    let options = MetricsOptions { use_manual_overrides: true, ..Default::default() };
    let r = calculator().compute_metrics(&input, options);
    assert_eq!(r.active_count, 1);
    assert!(r.rows[0].is_override);
    assert_eq!(r.rows[0].source, Source::Manual);
  }

  #[test]
  fn manual_closes_add_signups_not_calls() {
    let input = MetricsInput {
      calls: vec![call("a", "Demo", 1, "a@lead.com"), call("b", "Demo", 1, "b@lead.com")],
      manual_closes: vec![ManualClose {
        id:             "mc-1".into(),
        rep:            "rep@acme.io".into(),
        closed_at:      day(4),
        prospect_email: Some("walkin@lead.com".into()),
        notes:          None,
      }],
      ..MetricsInput::default()
    };

    let r = calculator().compute_metrics(&input, MetricsOptions::default());
    assert_eq!(r.signup_count, 0);
    assert_eq!(r.rows.len(), 2);

    let options = MetricsOptions { include_manual_closes: true, ..Default::default() };
    let r = calculator().compute_metrics(&input, options);
    assert_eq!(r.call_count, 2);
    assert_eq!(r.signup_count, 1);
    assert_eq!(r.manual_close_count, 1);
    assert_eq!(r.signup_rate, 50);
    assert_eq!(r.rows.len(), 3);
    assert_eq!(r.rows[2].kind, RowKind::ManualClose);
  }

  #[test]
  fn plan_skips_synthetic_keys_for_lookup() {
    let mut no_email = call("b", "Demo", 2, "rep@acme.io");
    no_email.participants.truncate(1);
    let calls = vec![call("a", "Demo", 1, "a@lead.com"), no_email];
    let plan = calculator().plan(&calls, &HashSet::new(), MetricsOptions::default());
    assert_eq!(plan.prospects.len(), 2);
    let keys: Vec<_> = plan.lookup_keys().map(ProspectKey::as_str).collect();
    assert_eq!(keys, ["a@lead.com"]);
  }

  #[test]
  fn percent_rounds_and_guards_zero() {
    assert_eq!(percent(0, 0), 0);
    assert_eq!(percent(5, 0), 0);
    assert_eq!(percent(1, 3), 33);
    assert_eq!(percent(2, 3), 67);
    assert_eq!(percent(1, 8), 13);
  }
}
