//! `GET /reps`: every rep with at least one call on record.

use std::sync::Arc;

use axum::{Json, extract::State};
use closerate_core::{
  service::MetricsService,
  store::{CallRepository, MetricsSources},
};

use crate::error::ApiError;

pub async fn list<S>(
  State(service): State<Arc<MetricsService<S>>>,
) -> Result<Json<Vec<String>>, ApiError>
where
  S: MetricsSources,
{
  let reps = service
    .sources()
    .list_reps()
    .await
    .map_err(ApiError::store)?;
  Ok(Json(reps))
}
