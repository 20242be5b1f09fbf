//! `closerate`: command-line client for the closerate server.
//!
//! # Usage
//!
//! ```text
//! closerate --url http://localhost:8080 metrics --period last_month --format markdown
//! closerate metrics --rep ana@acme.io --start 2024-01-01 --end 2024-01-31 --overrides
//! closerate classify "Ammara and Jonathan"
//! closerate override set call-123 signed_up --notes "paid by invoice"
//! ```

mod client;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use client::{ApiClient, ApiConfig, MetricsQuery};
use closerate_core::{
  call::{DateRange, Period},
  classify::{Classifier, ClassifierConfig},
  export,
  lifecycle::OverrideStatus,
  metrics::{MetricsOptions, MetricsResult},
};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "closerate", about = "Closing-rate metrics from recorded sales calls")]
struct Args {
  /// Path to a TOML config file (url, classifier settings).
  #[arg(short, long, value_name = "FILE", global = true)]
  config: Option<PathBuf>,

  /// Base URL of the closerate server (default: http://localhost:8080).
  #[arg(long, env = "CLOSERATE_URL", global = true)]
  url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Compute closing-rate metrics for a period.
  Metrics(MetricsArgs),
  /// Classify a call title locally, without contacting the server.
  Classify {
    title: String,
  },
  /// List every rep with recorded calls.
  Reps,
  /// Manage analyst overrides.
  #[command(subcommand)]
  Override(OverrideCommand),
  /// Leave a call out of metrics.
  Exclude {
    call_id: String,
    #[arg(long)]
    reason:  Option<String>,
  },
  /// Undo an exclusion.
  Include {
    call_id: String,
  },
}

#[derive(Subcommand, Debug)]
enum OverrideCommand {
  /// Set the outcome of a call: signed_up, active, churned, team, no_close.
  Set {
    call_id: String,
    status:  OverrideStatus,
    #[arg(long)]
    notes:   Option<String>,
  },
  /// Remove the override for a call.
  Clear {
    call_id: String,
  },
}

#[derive(clap::Args, Debug)]
struct MetricsArgs {
  /// Only calls hosted by this rep.
  #[arg(long)]
  rep: Option<String>,

  /// today, last_week, last_month or last_3_months. Ignored when --start
  /// and --end are given; defaults to last_month.
  #[arg(long, conflicts_with_all = ["start", "end"])]
  period: Option<Period>,

  /// Start of the range: YYYY-MM-DD or RFC 3339.
  #[arg(long, value_parser = parse_start, requires = "end")]
  start: Option<DateTime<Utc>>,

  /// End of the range (inclusive): YYYY-MM-DD or RFC 3339.
  #[arg(long, value_parser = parse_end, requires = "start")]
  end: Option<DateTime<Utc>>,

  /// Apply analyst overrides.
  #[arg(long)]
  overrides: bool,

  /// Count manually recorded closes as signups.
  #[arg(long)]
  manual_closes: bool,

  /// Keep calls that are on the exclusion list.
  #[arg(long)]
  include_excluded: bool,

  #[arg(long, value_enum, default_value_t = Format::Markdown)]
  format: Format,

  /// Write the report here instead of stdout.
  #[arg(short, long, value_name = "FILE")]
  output: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
  Json,
  Csv,
  Markdown,
}

fn parse_start(s: &str) -> Result<DateTime<Utc>, String> {
  parse_bound(s, NaiveTime::MIN)
}

fn parse_end(s: &str) -> Result<DateTime<Utc>, String> {
  let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
  parse_bound(s, end_of_day)
}

/// A bare date is widened to `time` on that day, UTC.
fn parse_bound(s: &str, time: NaiveTime) -> Result<DateTime<Utc>, String> {
  if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
    return Ok(date.and_time(time).and_utc());
  }
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| format!("expected YYYY-MM-DD or RFC 3339: {e}"))
}

impl MetricsArgs {
  fn query(&self, now: DateTime<Utc>) -> Result<MetricsQuery> {
    let range = match (self.start, self.end) {
      (Some(start), Some(end)) => DateRange::new(start, end)?,
      _ => DateRange::for_period(self.period.unwrap_or(Period::LastMonth), now),
    };
    Ok(MetricsQuery {
      rep:     self.rep.clone(),
      start:   range.start,
      end:     range.end,
      options: MetricsOptions {
        use_manual_overrides:   self.overrides,
        include_manual_closes:  self.manual_closes,
        include_excluded_calls: self.include_excluded,
      },
    })
  }
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:        String,
  #[serde(default)]
  classifier: ClassifierConfig,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let api_config = ApiConfig {
    base_url: args
      .url
      .or_else(|| (!file_cfg.url.is_empty()).then(|| file_cfg.url.clone()))
      .unwrap_or_else(|| "http://localhost:8080".to_string()),
  };

  let client = ApiClient::new(api_config)?;

  match args.command {
    Command::Metrics(metrics) => {
      let query = metrics.query(Utc::now())?;
      tracing::debug!(?query, "requesting metrics");
      let result = client.metrics(&query).await?;
      let report = render(&result, metrics.format)?;
      match &metrics.output {
        Some(path) => std::fs::write(path, report)
          .with_context(|| format!("writing report to {}", path.display()))?,
        None => print!("{report}"),
      }
    }
    Command::Classify { title } => {
      let classifier =
        Classifier::new(&file_cfg.classifier).context("invalid classifier configuration")?;
      let c = classifier.classify(Some(&title));
      println!("{} ({}%, {})", c.label, c.confidence, c.reason);
    }
    Command::Reps => {
      for rep in client.reps().await? {
        println!("{rep}");
      }
    }
    Command::Override(OverrideCommand::Set { call_id, status, notes }) => {
      let o = client.set_override(&call_id, status, notes.as_deref()).await?;
      println!("{} → {}", o.call_id, o.status);
    }
    Command::Override(OverrideCommand::Clear { call_id }) => {
      client.clear_override(&call_id).await?;
      println!("cleared override for {call_id}");
    }
    Command::Exclude { call_id, reason } => {
      client.exclude(&call_id, reason.as_deref()).await?;
      println!("excluded {call_id}");
    }
    Command::Include { call_id } => {
      client.include(&call_id).await?;
      println!("included {call_id}");
    }
  }
  Ok(())
}

fn render(result: &MetricsResult, format: Format) -> Result<String> {
  Ok(match format {
    Format::Json => export::to_json(result)? + "\n",
    Format::Csv => export::to_csv(result),
    Format::Markdown => export::to_markdown(result),
  })
}
