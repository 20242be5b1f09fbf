//! Async HTTP client wrapping the closerate JSON API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use closerate_core::{
  lifecycle::{Override, OverrideStatus},
  metrics::{MetricsOptions, MetricsResult},
};
use reqwest::{Client, Response};
use serde_json::json;

/// Connection settings for the closerate API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
}

/// One metrics query, already resolved to concrete bounds.
#[derive(Debug, Clone)]
pub struct MetricsQuery {
  pub rep:     Option<String>,
  pub start:   DateTime<Utc>,
  pub end:     DateTime<Utc>,
  pub options: MetricsOptions,
}

impl MetricsQuery {
  fn params(&self) -> Vec<(&'static str, String)> {
    let mut params = vec![
      ("start", self.start.to_rfc3339_opts(SecondsFormat::Secs, true)),
      ("end", self.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
      ("use_manual_overrides", self.options.use_manual_overrides.to_string()),
      ("include_manual_closes", self.options.include_manual_closes.to_string()),
      ("include_excluded_calls", self.options.include_excluded_calls.to_string()),
    ];
    if let Some(rep) = &self.rep {
      params.push(("rep", rep.clone()));
    }
    params
  }
}

/// Async HTTP client for the closerate JSON REST API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!(
      "{}/api{}",
      self.config.base_url.trim_end_matches('/'),
      path
    )
  }

  // ── Metrics ───────────────────────────────────────────────────────────────

  /// `GET /api/metrics`
  pub async fn metrics(&self, query: &MetricsQuery) -> Result<MetricsResult> {
    let resp = self
      .client
      .get(self.url("/metrics"))
      .query(&query.params())
      .send()
      .await
      .context("GET /metrics failed")?;
    let resp = check(resp, "GET /metrics").await?;
    resp.json().await.context("deserialising metrics")
  }

  /// `GET /api/reps`
  pub async fn reps(&self) -> Result<Vec<String>> {
    let resp = self
      .client
      .get(self.url("/reps"))
      .send()
      .await
      .context("GET /reps failed")?;
    let resp = check(resp, "GET /reps").await?;
    resp.json().await.context("deserialising reps")
  }

  // ── Corrections ───────────────────────────────────────────────────────────

  /// `PUT /api/overrides/{call_id}`
  pub async fn set_override(
    &self,
    call_id: &str,
    status: OverrideStatus,
    notes: Option<&str>,
  ) -> Result<Override> {
    let resp = self
      .client
      .put(self.url(&format!("/overrides/{call_id}")))
      .json(&json!({ "status": status, "notes": notes }))
      .send()
      .await
      .context("PUT /overrides failed")?;
    let resp = check(resp, "PUT /overrides").await?;
    resp.json().await.context("deserialising override")
  }

  /// `DELETE /api/overrides/{call_id}`
  pub async fn clear_override(&self, call_id: &str) -> Result<()> {
    let resp = self
      .client
      .delete(self.url(&format!("/overrides/{call_id}")))
      .send()
      .await
      .context("DELETE /overrides failed")?;
    check(resp, "DELETE /overrides").await?;
    Ok(())
  }

  /// `PUT /api/exclusions/{call_id}`
  pub async fn exclude(&self, call_id: &str, reason: Option<&str>) -> Result<()> {
    let resp = self
      .client
      .put(self.url(&format!("/exclusions/{call_id}")))
      .json(&json!({ "reason": reason }))
      .send()
      .await
      .context("PUT /exclusions failed")?;
    check(resp, "PUT /exclusions").await?;
    Ok(())
  }

  /// `DELETE /api/exclusions/{call_id}`
  pub async fn include(&self, call_id: &str) -> Result<()> {
    let resp = self
      .client
      .delete(self.url(&format!("/exclusions/{call_id}")))
      .send()
      .await
      .context("DELETE /exclusions failed")?;
    check(resp, "DELETE /exclusions").await?;
    Ok(())
  }
}

/// Turn a non-2xx response into an error carrying the server's message.
async fn check(resp: Response, what: &str) -> Result<Response> {
  let status = resp.status();
  if status.is_success() {
    return Ok(resp);
  }
  let body: serde_json::Value = resp.json().await.unwrap_or_default();
  match body["error"].as_str() {
    Some(message) => Err(anyhow!("{what} → {status}: {message}")),
    None => Err(anyhow!("{what} → {status}")),
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn url_joins_base_and_api_prefix() {
    let client = ApiClient::new(ApiConfig { base_url: "http://localhost:8080/".into() }).unwrap();
    assert_eq!(client.url("/metrics"), "http://localhost:8080/api/metrics");
  }

  #[test]
  fn query_params_are_flat() {
    let query = MetricsQuery {
      rep:     Some("ana@acme.io".into()),
      start:   Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
      end:     Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap(),
      options: MetricsOptions { include_manual_closes: true, ..Default::default() },
    };
    let params = query.params();
    assert!(params.contains(&("start", "2024-01-01T00:00:00Z".into())));
    assert!(params.contains(&("include_manual_closes", "true".into())));
    assert!(params.contains(&("use_manual_overrides", "false".into())));
    assert!(params.contains(&("rep", "ana@acme.io".into())));
  }
}
