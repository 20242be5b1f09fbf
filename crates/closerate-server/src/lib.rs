//! Server configuration and wiring for the closerate HTTP service.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use axum::Router;
use closerate_core::{
  classify::{Classifier, ClassifierConfig},
  dedupe::Deduplicator,
  metrics::MetricsCalculator,
  prospect::InternalDirectory,
  job::TracingSink,
  service::MetricsService,
  store::MetricsSources,
};
use serde::Deserialize;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `CLOSERATE_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  /// Email domains of the selling organisation, e.g. `acme.io`.
  pub internal_domains:   Vec<String>,
  /// Individual addresses reps also join calls from.
  pub rep_aliases:        Vec<String>,
  /// Upper bound for one subscription or event-log lookup.
  pub lookup_timeout_ms:  u64,
  /// Prospects looked up at once per metrics request.
  pub lookup_concurrency: usize,
  pub classifier:         ClassifierConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:               "127.0.0.1".to_owned(),
      port:               8080,
      store_path:         PathBuf::from("~/.local/share/closerate/closerate.db"),
      internal_domains:   Vec::new(),
      rep_aliases:        Vec::new(),
      lookup_timeout_ms:  2000,
      lookup_concurrency: 8,
      classifier:         ClassifierConfig::default(),
    }
  }
}

impl ServerConfig {
  /// Layer `path` (optional) under `CLOSERATE_*` environment variables.
  /// List-valued variables are comma separated.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("CLOSERATE")
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("internal_domains")
          .with_list_parse_key("rep_aliases"),
      )
      .build()
      .context("failed to read config file")?;

    settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn lookup_timeout(&self) -> Duration {
    Duration::from_millis(self.lookup_timeout_ms)
  }

  pub fn directory(&self) -> InternalDirectory {
    InternalDirectory::new(&self.internal_domains, &self.rep_aliases)
  }

  /// Compile the classifier and assemble the metrics pipeline.
  pub fn calculator(&self) -> anyhow::Result<MetricsCalculator> {
    let classifier =
      Classifier::new(&self.classifier).context("invalid classifier configuration")?;
    Ok(MetricsCalculator::new(
      classifier,
      Deduplicator::new(self.directory()),
    ))
  }
}

/// Build the service and mount its API under `/api`.
pub fn app<S>(config: &ServerConfig, store: Arc<S>) -> anyhow::Result<Router>
where
  S: MetricsSources + 'static,
{
  let service = MetricsService::new(store, config.calculator()?)
    .with_lookup_timeout(config.lookup_timeout())
    .with_lookup_concurrency(config.lookup_concurrency)
    .with_progress(Arc::new(TracingSink));
  Ok(Router::new().nest("/api", closerate_api::api_router(Arc::new(service))))
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
