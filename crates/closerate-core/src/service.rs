//! [`MetricsService`] fetches inputs from the collaborator stores and runs
//! the [`MetricsCalculator`] over them.
//!
//! Calls, exclusions, overrides and manual closes are required reads: if
//! one fails, the run fails. Per-prospect lifecycle lookups are best-effort:
//! an error or a timeout is logged and treated exactly like "no data". Up to
//! `lookup_concurrency` prospects are looked up at once.

use std::{
  collections::{HashMap, HashSet},
  fmt::Display,
  future::Future,
  sync::Arc,
  time::Duration,
};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
  call::{Call, DateRange},
  job::{JobState, NoopSink, ProgressSink},
  lifecycle::Override,
  metrics::{
    ManualClose, MetricsCalculator, MetricsInput, MetricsOptions, MetricsResult,
  },
  prospect::ProspectKey,
  store::{
    CallRepository, EventLogSource, ExclusionStore, ManualCloseStore,
    MetricsSources, OverrideStore, SubscriptionSource,
  },
};

pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_LOOKUP_CONCURRENCY: usize = 8;

#[derive(Debug, Error)]
pub enum ServiceError<E>
where
  E: std::error::Error + Send + Sync + 'static,
{
  #[error(transparent)]
  Invalid(#[from] crate::Error),

  #[error("source error: {0}")]
  Source(#[source] E),
}

/// One metrics request as received from a caller. The date bounds are
/// optional here so that their absence can be reported as a validation
/// error rather than a deserialisation failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsRequest {
  pub rep:     Option<String>,
  pub start:   Option<DateTime<Utc>>,
  pub end:     Option<DateTime<Utc>>,
  #[serde(default)]
  pub options: MetricsOptions,
}

impl MetricsRequest {
  pub fn new(rep: Option<String>, range: DateRange, options: MetricsOptions) -> Self {
    Self {
      rep,
      start: Some(range.start),
      end: Some(range.end),
      options,
    }
  }

  /// Fails with `MissingDateRange` or `InvalidDateRange`.
  pub fn validate(&self) -> crate::Result<DateRange> {
    DateRange::from_bounds(self.start, self.end)
  }
}

/// Inputs that must be read in full before anything is computed.
struct RequiredReads {
  calls:         Vec<Call>,
  excluded:      HashSet<String>,
  overrides:     HashMap<String, Override>,
  manual_closes: Vec<ManualClose>,
}

pub struct MetricsService<S> {
  sources:            Arc<S>,
  calculator:         MetricsCalculator,
  lookup_timeout:     Duration,
  lookup_concurrency: usize,
  progress:           Arc<dyn ProgressSink>,
}

impl<S> MetricsService<S>
where
  S: MetricsSources,
{
  pub fn new(sources: Arc<S>, calculator: MetricsCalculator) -> Self {
    Self {
      sources,
      calculator,
      lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
      lookup_concurrency: DEFAULT_LOOKUP_CONCURRENCY,
      progress: Arc::new(NoopSink),
    }
  }

  pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
    self.lookup_timeout = timeout;
    self
  }

  /// Clamped to at least one.
  pub fn with_lookup_concurrency(mut self, concurrency: usize) -> Self {
    self.lookup_concurrency = concurrency.max(1);
    self
  }

  /// Sink used by [`Self::compute`]. Defaults to [`NoopSink`].
  pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
    self.progress = sink;
    self
  }

  pub fn sources(&self) -> &Arc<S> { &self.sources }

  pub fn calculator(&self) -> &MetricsCalculator { &self.calculator }

  pub async fn compute(
    &self,
    request: &MetricsRequest,
  ) -> Result<MetricsResult, ServiceError<S::Error>> {
    self.compute_with_progress(request, self.progress.as_ref()).await
  }

  /// Run the full pipeline, reporting progress to `sink`.
  ///
  /// The job starts once the request is valid. A failed required read fails
  /// the job; lookups advance it one prospect at a time.
  pub async fn compute_with_progress(
    &self,
    request: &MetricsRequest,
    sink: &dyn ProgressSink,
  ) -> Result<MetricsResult, ServiceError<S::Error>> {
    let range = request.validate()?;
    let rep = request.rep.as_deref();
    let options = request.options;

    let mut job = JobState::start("metrics", 0, sink);
    let reads = match self.required_reads(rep, range, options).await {
      Ok(reads) => reads,
      Err(error) => {
        job.fail(error.to_string(), sink);
        return Err(ServiceError::Source(error));
      }
    };

    let plan = self.calculator.plan(&reads.calls, &reads.excluded, options);
    let keys: Vec<&ProspectKey> = plan.lookup_keys().collect();
    tracing::info!(
      rep = rep.unwrap_or("*"),
      calls = reads.calls.len(),
      prospects = keys.len(),
      concurrency = self.lookup_concurrency,
      "looking up lifecycle snapshots"
    );
    job.set_total(keys.len(), sink);

    let mut subscriptions = HashMap::new();
    let mut events = HashMap::new();
    let mut lookups = stream::iter(keys)
      .map(move |key| async move {
        let (subscription, event) = tokio::join!(
          self.bounded("subscription", key, self.sources.get_status(key)),
          self.bounded("eventlog", key, self.sources.get_latest_status(key)),
        );
        (key, subscription, event)
      })
      .buffer_unordered(self.lookup_concurrency)
      .boxed();
    while let Some((key, subscription, event)) = lookups.next().await {
      if let Some(snapshot) = subscription {
        subscriptions.insert(key.clone(), snapshot);
      }
      if let Some(snapshot) = event {
        events.insert(key.clone(), snapshot);
      }
      job.advance(1, sink);
    }
    job.complete(sink);

    let input = MetricsInput {
      calls: reads.calls,
      overrides: reads.overrides,
      subscriptions,
      events,
      excluded: reads.excluded,
      manual_closes: reads.manual_closes,
    };
    Ok(
      self
        .calculator
        .compute_metrics(&input, options)
        .for_request(request.rep.clone(), range),
    )
  }

  async fn required_reads(
    &self,
    rep: Option<&str>,
    range: DateRange,
    options: MetricsOptions,
  ) -> Result<RequiredReads, S::Error> {
    let calls = self
      .sources
      .list_sales_candidates(rep, range.start, range.end)
      .await?;
    let excluded = self.sources.get_excluded_call_ids().await?;
    let overrides = if options.use_manual_overrides {
      self.sources.get_all().await?
    } else {
      HashMap::new()
    };
    let manual_closes = if options.include_manual_closes {
      self.sources.list(range.start, range.end, rep).await?
    } else {
      Vec::new()
    };
    Ok(RequiredReads { calls, excluded, overrides, manual_closes })
  }

  /// Await one best-effort lookup. Errors and timeouts become `None`.
  async fn bounded<T, E>(
    &self,
    source: &'static str,
    key: &ProspectKey,
    lookup: impl Future<Output = Result<Option<T>, E>>,
  ) -> Option<T>
  where
    E: Display,
  {
    match tokio::time::timeout(self.lookup_timeout, lookup).await {
      Ok(Ok(found)) => found,
      Ok(Err(error)) => {
        tracing::warn!(%key, source, %error, "lookup failed, treating as no data");
        None
      }
      Err(_) => {
        tracing::warn!(
          %key,
          source,
          timeout_ms = self.lookup_timeout.as_millis() as u64,
          "lookup timed out, treating as no data"
        );
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
  };

  use chrono::TimeZone;

  use super::*;
  use crate::{
    call::{Call, Participant},
    classify::Classifier,
    dedupe::Deduplicator,
    job::JobStatus,
    lifecycle::{
      EventSnapshot, EventStatus, Override, OverrideStatus, Source,
      SubscriptionSnapshot, SubscriptionStatus,
    },
    metrics::ManualClose,
    prospect::InternalDirectory,
    store,
  };

  #[derive(Debug, Error)]
  #[error("fake store failure")]
  struct FakeError;

  #[derive(Default)]
  struct FakeSources {
    calls:          Vec<Call>,
    subscriptions:  HashMap<String, SubscriptionSnapshot>,
    events:         HashMap<String, EventSnapshot>,
    overrides:      HashMap<String, Override>,
    failing_calls:  bool,
    failing_events: bool,
    slow_events:    bool,
    in_flight:      AtomicUsize,
    max_in_flight:  AtomicUsize,
  }

  impl store::Source for FakeSources {
    type Error = FakeError;
  }

  impl CallRepository for FakeSources {
    async fn list_sales_candidates(
      &self,
      rep: Option<&str>,
      start: DateTime<Utc>,
      end: DateTime<Utc>,
    ) -> Result<Vec<Call>, FakeError> {
      if self.failing_calls {
        return Err(FakeError);
      }
      Ok(
        self
          .calls
          .iter()
          .filter(|c| rep.is_none_or(|r| c.rep == r))
          .filter(|c| start <= c.datetime && c.datetime <= end)
          .cloned()
          .collect(),
      )
    }

    async fn list_reps(&self) -> Result<Vec<String>, FakeError> { Ok(vec![]) }
  }

  impl OverrideStore for FakeSources {
    async fn get_all(&self) -> Result<HashMap<String, Override>, FakeError> {
      Ok(self.overrides.clone())
    }

    async fn set_override(
      &self,
      _: String,
      _: OverrideStatus,
      _: Option<String>,
    ) -> Result<Override, FakeError> {
      Err(FakeError)
    }

    async fn clear_override(&self, _: String) -> Result<bool, FakeError> { Ok(false) }
  }

  impl SubscriptionSource for FakeSources {
    async fn get_status(
      &self,
      prospect: &ProspectKey,
    ) -> Result<Option<SubscriptionSnapshot>, FakeError> {
      let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
      self.max_in_flight.fetch_max(now, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(5)).await;
      self.in_flight.fetch_sub(1, Ordering::SeqCst);
      Ok(self.subscriptions.get(prospect.as_str()).cloned())
    }
  }

  impl EventLogSource for FakeSources {
    async fn get_latest_status(
      &self,
      prospect: &ProspectKey,
    ) -> Result<Option<EventSnapshot>, FakeError> {
      if self.failing_events {
        return Err(FakeError);
      }
      if self.slow_events {
        tokio::time::sleep(Duration::from_secs(5)).await;
      }
      Ok(self.events.get(prospect.as_str()).cloned())
    }
  }

  impl ExclusionStore for FakeSources {
    async fn get_excluded_call_ids(&self) -> Result<HashSet<String>, FakeError> {
      Ok(HashSet::new())
    }

    async fn exclude_call(&self, _: String, _: Option<String>) -> Result<(), FakeError> {
      Ok(())
    }

    async fn include_call(&self, _: String) -> Result<bool, FakeError> { Ok(false) }
  }

  impl ManualCloseStore for FakeSources {
    async fn list(
      &self,
      _: DateTime<Utc>,
      _: DateTime<Utc>,
      _: Option<&str>,
    ) -> Result<Vec<ManualClose>, FakeError> {
      Ok(vec![])
    }

    async fn record_manual_close(&self, close: ManualClose) -> Result<ManualClose, FakeError> {
      Ok(close)
    }
  }

  #[derive(Default)]
  struct Recorder(Mutex<Vec<JobState>>);

  impl ProgressSink for Recorder {
    fn report(&self, state: &JobState) { self.0.lock().unwrap().push(state.clone()); }
  }

  fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, 9, 0, 0).unwrap()
  }

  fn call(id: &str, d: u32, email: &str) -> Call {
    Call {
      id:               id.into(),
      title:            Some("Discovery call".into()),
      datetime:         day(d),
      rep:              "rep@acme.io".into(),
      duration_seconds: 1200,
      participants:     vec![
        Participant::with_email("rep@acme.io"),
        Participant::with_email(email),
      ],
      matched_email:    None,
    }
  }

  fn service(sources: FakeSources) -> MetricsService<FakeSources> {
    let calculator = MetricsCalculator::new(
      Classifier::default(),
      Deduplicator::new(InternalDirectory::new(["acme.io"], Vec::<String>::new())),
    );
    MetricsService::new(Arc::new(sources), calculator)
      .with_lookup_timeout(Duration::from_millis(50))
  }

  fn january(options: MetricsOptions) -> MetricsRequest {
    MetricsRequest {
      rep: Some("rep@acme.io".into()),
      start: Some(day(1)),
      end: Some(day(31)),
      options,
    }
  }

  fn sample_sources() -> FakeSources {
    FakeSources {
      calls: vec![
        call("jan-01", 1, "pat@lead.com"),
        call("jan-05", 5, "pat@lead.com"),
        call("jan-10", 10, "pat@lead.com"),
      ],
      subscriptions: HashMap::from([(
        "pat@lead.com".to_owned(),
        SubscriptionSnapshot {
          matched:     true,
          status:      SubscriptionStatus::Active,
          signup_date: Some(day(8)),
        },
      )]),
      ..FakeSources::default()
    }
  }

  #[tokio::test]
  async fn end_to_end_for_one_prospect() {
    let svc = service(sample_sources());
    let r = svc.compute(&january(MetricsOptions::default())).await.unwrap();

    assert_eq!(r.rep.as_deref(), Some("rep@acme.io"));
    assert_eq!(r.call_count, 1);
    assert_eq!(r.signup_count, 1);
    assert_eq!(r.active_count, 1);
    assert_eq!(r.signup_rate, 100);
    assert_eq!(r.active_rate, 100);
    assert_eq!(r.avg_days_to_signup, Some(7));
    assert_eq!(r.rows[0].id, "jan-01");
    assert_eq!(r.rows[0].source, Source::Subscription);
  }

  #[tokio::test]
  async fn missing_range_is_rejected_before_reading() {
    let svc = service(FakeSources { failing_calls: true, ..FakeSources::default() });
    let request = MetricsRequest { start: Some(day(1)), ..MetricsRequest::default() };
    let err = svc.compute(&request).await.unwrap_err();
    assert!(matches!(err, ServiceError::Invalid(crate::Error::MissingDateRange)));
  }

  #[tokio::test]
  async fn call_listing_failure_fails_the_run() {
    let svc = service(FakeSources { failing_calls: true, ..FakeSources::default() });
    let err = svc.compute(&january(MetricsOptions::default())).await.unwrap_err();
    assert!(matches!(err, ServiceError::Source(FakeError)));
  }

  #[tokio::test]
  async fn failing_event_lookup_degrades_to_unmatched() {
    let mut sources = sample_sources();
    sources.subscriptions.clear();
    sources.failing_events = true;
    let r = service(sources).compute(&january(MetricsOptions::default())).await.unwrap();
    assert_eq!(r.call_count, 1);
    assert_eq!(r.signup_count, 0);
    assert_eq!(r.rows[0].source, Source::None);
  }

  #[tokio::test]
  async fn timed_out_event_lookup_is_no_data() {
    let mut sources = sample_sources();
    sources.subscriptions.clear();
    sources.events.insert(
      "pat@lead.com".into(),
      EventSnapshot { status: EventStatus::Active, timestamp: day(3) },
    );
    sources.slow_events = true;
    let r = service(sources).compute(&january(MetricsOptions::default())).await.unwrap();
    assert_eq!(r.signup_count, 0);
    assert_eq!(r.rows[0].label, "unmatched");
  }

  #[tokio::test]
  async fn overrides_are_read_only_when_enabled() {
    let mut sources = sample_sources();
    sources.overrides.insert(
      "jan-01".into(),
      Override {
        call_id:    "jan-01".into(),
        status:     OverrideStatus::NoClose,
        notes:      None,
        updated_at: day(12),
      },
    );
    let svc = service(sources);

    let r = svc.compute(&january(MetricsOptions::default())).await.unwrap();
    assert_eq!(r.signup_count, 1);

    let options = MetricsOptions { use_manual_overrides: true, ..Default::default() };
    let r = svc.compute(&january(options)).await.unwrap();
    assert_eq!(r.signup_count, 0);
    assert_eq!(r.no_close_count, 1);
    assert!(r.rows[0].is_override);
  }

  #[tokio::test]
  async fn progress_is_reported_per_prospect() {
    let mut sources = sample_sources();
    sources.calls.push(call("other", 2, "sam@other.com"));
    let sink = Recorder::default();
    service(sources)
      .compute_with_progress(&january(MetricsOptions::default()), &sink)
      .await
      .unwrap();

    let states = sink.0.lock().unwrap();
    // start, total known, one per prospect, completion
    assert_eq!(states.len(), 5);
    assert_eq!(states[1].total, 2);
    assert!(states.iter().all(|s| s.job_id == states[0].job_id));
    let last = states.last().unwrap();
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.processed, 2);
  }

  #[tokio::test]
  async fn failed_required_read_fails_the_job() {
    let sink = Recorder::default();
    let svc = service(FakeSources { failing_calls: true, ..FakeSources::default() });
    let err = svc
      .compute_with_progress(&january(MetricsOptions::default()), &sink)
      .await
      .unwrap_err();
    assert!(matches!(err, ServiceError::Source(FakeError)));

    let states = sink.0.lock().unwrap();
    let last = states.last().unwrap();
    assert_eq!(last.status, JobStatus::Failed);
    assert_eq!(last.error.as_deref(), Some("fake store failure"));
  }

  #[tokio::test]
  async fn configured_sink_is_used_by_compute() {
    let sink = Arc::new(Recorder::default());
    let svc = service(sample_sources()).with_progress(sink.clone());
    svc.compute(&january(MetricsOptions::default())).await.unwrap();
    assert_eq!(sink.0.lock().unwrap().last().map(|s| s.status), Some(JobStatus::Completed));
  }

  fn many_prospects() -> FakeSources {
    FakeSources {
      calls: (1..=4)
        .map(|d| call(&format!("c{d}"), d, &format!("lead{d}@other.com")))
        .collect(),
      ..FakeSources::default()
    }
  }

  #[tokio::test]
  async fn prospects_are_looked_up_concurrently() {
    let svc = service(many_prospects());
    let r = svc.compute(&january(MetricsOptions::default())).await.unwrap();
    assert_eq!(r.call_count, 4);
    assert_eq!(svc.sources().max_in_flight.load(Ordering::SeqCst), 4);
  }

  #[tokio::test]
  async fn lookup_concurrency_is_bounded() {
    let svc = service(many_prospects()).with_lookup_concurrency(1);
    svc.compute(&january(MetricsOptions::default())).await.unwrap();
    assert_eq!(svc.sources().max_in_flight.load(Ordering::SeqCst), 1);
  }
}
