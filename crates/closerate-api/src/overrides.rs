//! Handlers for `/overrides` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/overrides` | All overrides, sorted by call id |
//! | `PUT`    | `/overrides/{call_id}` | Body: `{"status":"active","notes":".."}`; last write wins |
//! | `DELETE` | `/overrides/{call_id}` | 404 if there is none |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use closerate_core::{
  lifecycle::{Override, OverrideStatus},
  service::MetricsService,
  store::{MetricsSources, OverrideStore},
};
use serde::Deserialize;

use crate::error::ApiError;

/// `GET /overrides`
pub async fn list<S>(
  State(service): State<Arc<MetricsService<S>>>,
) -> Result<Json<Vec<Override>>, ApiError>
where
  S: MetricsSources,
{
  let mut overrides: Vec<Override> = service
    .sources()
    .get_all()
    .await
    .map_err(ApiError::store)?
    .into_values()
    .collect();
  overrides.sort_by(|a, b| a.call_id.cmp(&b.call_id));
  Ok(Json(overrides))
}

#[derive(Debug, Deserialize)]
pub struct SetBody {
  pub status: OverrideStatus,
  #[serde(default)]
  pub notes:  Option<String>,
}

/// `PUT /overrides/{call_id}`
pub async fn set<S>(
  State(service): State<Arc<MetricsService<S>>>,
  Path(call_id): Path<String>,
  Json(body): Json<SetBody>,
) -> Result<Json<Override>, ApiError>
where
  S: MetricsSources,
{
  let override_ = service
    .sources()
    .set_override(call_id, body.status, body.notes)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(override_))
}

/// `DELETE /overrides/{call_id}`
pub async fn clear<S>(
  State(service): State<Arc<MetricsService<S>>>,
  Path(call_id): Path<String>,
) -> Result<StatusCode, ApiError>
where
  S: MetricsSources,
{
  let existed = service
    .sources()
    .clear_override(call_id.clone())
    .await
    .map_err(ApiError::store)?;
  if existed {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!("no override for call {call_id}")))
  }
}
