//! Handlers for `/metrics` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/metrics` | `?start&end` or `?period`, optional `rep` and toggles |
//! | `GET`  | `/metrics/export.csv` | Same parameters, `text/csv` body |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
  http::header,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use closerate_core::{
  call::{DateRange, Period},
  export,
  metrics::{MetricsOptions, MetricsResult},
  service::{MetricsRequest, MetricsService},
  store::MetricsSources,
};
use serde::Deserialize;

use crate::error::ApiError;

/// Flat query string; the toggles are top-level parameters.
#[derive(Debug, Default, Deserialize)]
pub struct MetricsParams {
  pub rep:                    Option<String>,
  pub start:                  Option<DateTime<Utc>>,
  pub end:                    Option<DateTime<Utc>>,
  /// Used only when neither `start` nor `end` is given.
  pub period:                 Option<Period>,
  #[serde(default)]
  pub use_manual_overrides:   bool,
  #[serde(default)]
  pub include_manual_closes:  bool,
  #[serde(default)]
  pub include_excluded_calls: bool,
}

impl MetricsParams {
  pub fn into_request(self, now: DateTime<Utc>) -> MetricsRequest {
    let (start, end) = match (self.start, self.end, self.period) {
      (None, None, Some(period)) => {
        let range = DateRange::for_period(period, now);
        (Some(range.start), Some(range.end))
      }
      (start, end, _) => (start, end),
    };
    MetricsRequest {
      rep: self.rep.filter(|r| !r.trim().is_empty()),
      start,
      end,
      options: MetricsOptions {
        use_manual_overrides:   self.use_manual_overrides,
        include_manual_closes:  self.include_manual_closes,
        include_excluded_calls: self.include_excluded_calls,
      },
    }
  }
}

async fn run<S>(
  service: &MetricsService<S>,
  params: MetricsParams,
) -> Result<MetricsResult, ApiError>
where
  S: MetricsSources,
{
  let request = params.into_request(Utc::now());
  Ok(service.compute(&request).await?)
}

/// `GET /metrics`
pub async fn compute<S>(
  State(service): State<Arc<MetricsService<S>>>,
  Query(params): Query<MetricsParams>,
) -> Result<Json<MetricsResult>, ApiError>
where
  S: MetricsSources,
{
  Ok(Json(run(&service, params).await?))
}

/// `GET /metrics/export.csv`
pub async fn export_csv<S>(
  State(service): State<Arc<MetricsService<S>>>,
  Query(params): Query<MetricsParams>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MetricsSources,
{
  let result = run(&service, params).await?;
  Ok((
    [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
    export::to_csv(&result),
  ))
}
