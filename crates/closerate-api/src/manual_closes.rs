//! `POST /manual-closes`: record a deal closed outside any analysed call.

use std::sync::Arc;

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use closerate_core::{
  metrics::ManualClose,
  prospect::normalize_email,
  service::MetricsService,
  store::{ManualCloseStore, MetricsSources},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub rep:            String,
  pub closed_at:      DateTime<Utc>,
  #[serde(default)]
  pub prospect_email: Option<String>,
  #[serde(default)]
  pub notes:          Option<String>,
}

pub async fn create<S>(
  State(service): State<Arc<MetricsService<S>>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MetricsSources,
{
  let rep = body.rep.trim();
  if rep.is_empty() {
    return Err(ApiError::BadRequest("rep must not be empty".into()));
  }
  let prospect_email = match body.prospect_email.as_deref() {
    None => None,
    Some(raw) => Some(
      normalize_email(raw)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid email {raw:?}")))?,
    ),
  };

  let close = ManualClose {
    id: Uuid::new_v4().to_string(),
    rep: rep.to_owned(),
    closed_at: body.closed_at,
    prospect_email,
    notes: body.notes,
  };
  let close = service
    .sources()
    .record_manual_close(close)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(close)))
}
