//! Handlers for `/exclusions/{call_id}`. Excluded calls are left out of
//! metrics unless the request sets `include_excluded_calls`.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use closerate_core::{
  service::MetricsService,
  store::{ExclusionStore, MetricsSources},
};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct ExcludeBody {
  #[serde(default)]
  pub reason: Option<String>,
}

/// `PUT /exclusions/{call_id}` with optional body `{"reason": ".."}`.
pub async fn exclude<S>(
  State(service): State<Arc<MetricsService<S>>>,
  Path(call_id): Path<String>,
  body: Option<Json<ExcludeBody>>,
) -> Result<StatusCode, ApiError>
where
  S: MetricsSources,
{
  let reason = body.and_then(|Json(b)| b.reason);
  service
    .sources()
    .exclude_call(call_id, reason)
    .await
    .map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /exclusions/{call_id}`; idempotent.
pub async fn include<S>(
  State(service): State<Arc<MetricsService<S>>>,
  Path(call_id): Path<String>,
) -> Result<StatusCode, ApiError>
where
  S: MetricsSources,
{
  service
    .sources()
    .include_call(call_id)
    .await
    .map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}
