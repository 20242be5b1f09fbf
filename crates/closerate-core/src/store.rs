//! Read interfaces onto the systems this crate consumes.
//!
//! Every collaborator shares a single [`Source::Error`] type so a backend
//! implementing several of them (e.g. `closerate-store-sqlite`) can be used
//! behind one generic parameter. Write methods exist only where an analyst
//! workflow needs them; calls and lifecycle snapshots are written by
//! external ingestion and enrichment jobs.
//!
//! All methods return `Send` futures so implementations can be driven from
//! a multi-threaded runtime (tokio with `axum`).

use std::{
  collections::{HashMap, HashSet},
  future::Future,
};

use chrono::{DateTime, Utc};

use crate::{
  call::Call,
  lifecycle::{EventSnapshot, Override, OverrideStatus, SubscriptionSnapshot},
  metrics::ManualClose,
  prospect::ProspectKey,
};

/// Common supertrait carrying the backend's error type.
pub trait Source: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;
}

// ─── Calls ───────────────────────────────────────────────────────────────────

pub trait CallRepository: Source {
  /// Calls held in `[start, end]`, optionally for one rep. Soft-deleted
  /// calls are never returned.
  fn list_sales_candidates<'a>(
    &'a self,
    rep: Option<&'a str>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Call>, Self::Error>> + Send + 'a;

  /// Distinct rep identifiers with at least one live call, sorted.
  fn list_reps(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;
}

// ─── Overrides ───────────────────────────────────────────────────────────────

pub trait OverrideStore: Source {
  /// All overrides, keyed by call id.
  fn get_all(
    &self,
  ) -> impl Future<Output = Result<HashMap<String, Override>, Self::Error>>
  + Send
  + '_;

  /// Record an analyst decision for `call_id`, replacing any earlier one.
  fn set_override(
    &self,
    call_id: String,
    status: OverrideStatus,
    notes: Option<String>,
  ) -> impl Future<Output = Result<Override, Self::Error>> + Send + '_;

  /// Remove the override for `call_id`. Returns whether one existed.
  fn clear_override(
    &self,
    call_id: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

// ─── Lifecycle snapshots ─────────────────────────────────────────────────────

pub trait SubscriptionSource: Source {
  /// The cached billing status for a prospect, if any.
  fn get_status<'a>(
    &'a self,
    prospect: &'a ProspectKey,
  ) -> impl Future<Output = Result<Option<SubscriptionSnapshot>, Self::Error>>
  + Send
  + 'a;
}

pub trait EventLogSource: Source {
  /// The most recent parsed lifecycle event for a prospect, if any.
  fn get_latest_status<'a>(
    &'a self,
    prospect: &'a ProspectKey,
  ) -> impl Future<Output = Result<Option<EventSnapshot>, Self::Error>> + Send + 'a;
}

// ─── Exclusions & manual closes ──────────────────────────────────────────────

pub trait ExclusionStore: Source {
  fn get_excluded_call_ids(
    &self,
  ) -> impl Future<Output = Result<HashSet<String>, Self::Error>> + Send + '_;

  fn exclude_call(
    &self,
    call_id: String,
    reason: Option<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Returns whether the call was excluded before.
  fn include_call(
    &self,
    call_id: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

pub trait ManualCloseStore: Source {
  /// Manual closes in `[start, end]`, optionally for one rep.
  fn list<'a>(
    &'a self,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    rep: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<ManualClose>, Self::Error>> + Send + 'a;

  fn record_manual_close(
    &self,
    close: ManualClose,
  ) -> impl Future<Output = Result<ManualClose, Self::Error>> + Send + '_;
}

/// Everything [`crate::service::MetricsService`] reads from.
pub trait MetricsSources:
  CallRepository
  + OverrideStore
  + SubscriptionSource
  + EventLogSource
  + ExclusionStore
  + ManualCloseStore
{
}

impl<T> MetricsSources for T where
  T: CallRepository
    + OverrideStore
    + SubscriptionSource
    + EventLogSource
    + ExclusionStore
    + ManualCloseStore
{
}
