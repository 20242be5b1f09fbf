//! `POST /classify`: run the configured classifier over one title.

use std::sync::Arc;

use axum::{Json, extract::State};
use closerate_core::{
  classify::Classification,
  service::MetricsService,
  store::MetricsSources,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ClassifyBody {
  #[serde(default)]
  pub title: Option<String>,
}

/// `POST /classify` with body `{"title": "..."}`. A missing or null title
/// classifies as review-needed.
pub async fn handler<S>(
  State(service): State<Arc<MetricsService<S>>>,
  Json(body): Json<ClassifyBody>,
) -> Json<Classification>
where
  S: MetricsSources,
{
  Json(
    service
      .calculator()
      .classifier()
      .classify(body.title.as_deref()),
  )
}
