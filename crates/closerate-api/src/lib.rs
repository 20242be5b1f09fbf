//! JSON REST API for closerate.
//!
//! Exposes an axum [`Router`] over a [`MetricsService`] backed by any store
//! implementing [`MetricsSources`]. Auth, TLS, and transport concerns are
//! the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", closerate_api::api_router(service.clone()))
//! ```

pub mod classify;
pub mod error;
pub mod exclusions;
pub mod manual_closes;
pub mod metrics;
pub mod overrides;
pub mod reps;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use closerate_core::{service::MetricsService, store::MetricsSources};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Build a fully-materialised API router for `service`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(service: Arc<MetricsService<S>>) -> Router<()>
where
  S: MetricsSources + 'static,
{
  Router::new()
    // Metrics
    .route("/metrics", get(metrics::compute::<S>))
    .route("/metrics/export.csv", get(metrics::export_csv::<S>))
    .route("/classify", post(classify::handler::<S>))
    .route("/reps", get(reps::list::<S>))
    // Analyst corrections
    .route("/overrides", get(overrides::list::<S>))
    .route(
      "/overrides/{call_id}",
      put(overrides::set::<S>).delete(overrides::clear::<S>),
    )
    .route(
      "/exclusions/{call_id}",
      put(exclusions::exclude::<S>).delete(exclusions::include::<S>),
    )
    .route("/manual-closes", post(manual_closes::create::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(service)
}
