//! Progress tracking for long-running jobs.
//!
//! A job's state is an ordinary value owned by whoever started it. Progress
//! is pushed to an injected [`ProgressSink`], so concurrent runs never share
//! anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use uuid::Uuid;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
  Running,
  Completed,
  Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
  pub job_id:      Uuid,
  /// Free-text job type, e.g. `"lifecycle_lookup"`.
  pub kind:        String,
  pub status:      JobStatus,
  pub processed:   usize,
  pub total:       usize,
  pub started_at:  DateTime<Utc>,
  pub finished_at: Option<DateTime<Utc>>,
  pub error:       Option<String>,
}

impl JobState {
  /// Start a job and announce it to `sink`.
  pub fn start(
    kind: impl Into<String>,
    total: usize,
    sink: &dyn ProgressSink,
  ) -> Self {
    let state = Self {
      job_id: Uuid::new_v4(),
      kind: kind.into(),
      status: JobStatus::Running,
      processed: 0,
      total,
      started_at: Utc::now(),
      finished_at: None,
      error: None,
    };
    sink.report(&state);
    state
  }

  /// Set the amount of work once it is known.
  pub fn set_total(&mut self, total: usize, sink: &dyn ProgressSink) {
    self.total = total;
    self.processed = self.processed.min(total);
    sink.report(self);
  }

  pub fn advance(&mut self, by: usize, sink: &dyn ProgressSink) {
    self.processed = (self.processed + by).min(self.total);
    sink.report(self);
  }

  pub fn complete(&mut self, sink: &dyn ProgressSink) {
    self.status = JobStatus::Completed;
    self.processed = self.total;
    self.finished_at = Some(Utc::now());
    sink.report(self);
  }

  pub fn fail(&mut self, error: impl Into<String>, sink: &dyn ProgressSink) {
    self.status = JobStatus::Failed;
    self.error = Some(error.into());
    self.finished_at = Some(Utc::now());
    sink.report(self);
  }

  /// Whole-percent progress; an empty job counts as done.
  pub fn percent(&self) -> u32 {
    if self.total == 0 {
      return 100;
    }
    crate::metrics::percent(self.processed, self.total)
  }
}

/// Receives every state change of a job.
pub trait ProgressSink: Send + Sync {
  fn report(&self, state: &JobState);
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
  fn report(&self, _: &JobState) {}
}

/// Logs progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
  fn report(&self, state: &JobState) {
    tracing::debug!(
      job = %state.job_id,
      kind = %state.kind,
      status = %state.status,
      processed = state.processed,
      total = state.total,
      percent = state.percent(),
      "job progress"
    );
  }
}
