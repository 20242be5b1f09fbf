//! Render a [`MetricsResult`] for people: CSV for spreadsheets, Markdown
//! for reports, pretty JSON for everything else.

use std::fmt::Write as _;

use crate::{
  Result,
  metrics::{MetricsResult, RowKind},
};

const CSV_HEADER: &[&str] = &[
  "kind",
  "id",
  "title",
  "date",
  "rep",
  "prospect",
  "label",
  "source",
  "raw_status",
  "is_override",
  "days_to_signup",
];

pub fn to_json(result: &MetricsResult) -> Result<String> {
  Ok(serde_json::to_string_pretty(result)?)
}

/// One row per audit row, with an RFC 4180 header.
pub fn to_csv(result: &MetricsResult) -> String {
  let mut out = String::new();
  push_csv_line(&mut out, CSV_HEADER.iter().copied());

  for row in &result.rows {
    let kind = match row.kind {
      RowKind::Call => "call",
      RowKind::ManualClose => "manual_close",
    };
    let date = row.date.to_rfc3339();
    let days = row.days_to_signup.map(|d| d.to_string()).unwrap_or_default();
    push_csv_line(
      &mut out,
      [
        kind,
        &row.id,
        row.title.as_deref().unwrap_or_default(),
        &date,
        &row.rep,
        row.prospect.as_deref().unwrap_or_default(),
        &row.label,
        row.source.as_ref(),
        &row.raw_status,
        if row.is_override { "true" } else { "false" },
        &days,
      ],
    );
  }
  out
}

fn push_csv_line<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
  let line = fields
    .into_iter()
    .map(csv_field)
    .collect::<Vec<_>>()
    .join(",");
  out.push_str(&line);
  out.push_str("\r\n");
}

fn csv_field(value: &str) -> String {
  if value.contains([',', '"', '\n', '\r']) {
    format!("\"{}\"", value.replace('"', "\"\""))
  } else {
    value.to_owned()
  }
}

/// Summary table followed by the audit trail.
pub fn to_markdown(result: &MetricsResult) -> String {
  let mut md = String::from("# Closing-rate report\n\n");

  if let Some(rep) = &result.rep {
    let _ = writeln!(md, "**Rep:** {rep}  ");
  }
  if let Some(range) = &result.range {
    let _ = writeln!(
      md,
      "**Period:** {} – {}  ",
      range.start.format("%Y-%m-%d"),
      range.end.format("%Y-%m-%d")
    );
  }

  md.push_str("\n| Metric | Value |\n|---|---|\n");
  let avg = result
    .avg_days_to_signup
    .map(|d| format!("{d} days"))
    .unwrap_or_else(|| "n/a".to_owned());
  for (metric, value) in [
    ("Calls (raw)", result.raw_call_count.to_string()),
    ("Sales calls", result.sales_call_count.to_string()),
    ("Excluded", result.excluded_count.to_string()),
    ("Calls analysed", result.call_count.to_string()),
    ("Signups", result.signup_count.to_string()),
    ("Active", result.active_count.to_string()),
    ("Churned", result.churned_count.to_string()),
    ("Team", result.team_count.to_string()),
    ("No close", result.no_close_count.to_string()),
    ("Manual closes", result.manual_close_count.to_string()),
    ("Signup rate", format!("{}%", result.signup_rate)),
    ("Active rate", format!("{}%", result.active_rate)),
    ("Churn rate", format!("{}%", result.churned_rate)),
    ("Avg. days to signup", avg),
  ] {
    let _ = writeln!(md, "| {metric} | {value} |");
  }

  if !result.rows.is_empty() {
    md.push_str("\n## Calls\n\n| Date | Title | Prospect | Outcome | Source | Override |\n|---|---|---|---|---|---|\n");
    for row in &result.rows {
      let _ = writeln!(
        md,
        "| {} | {} | {} | {} | {} | {} |",
        row.date.format("%Y-%m-%d"),
        escape_cell(row.title.as_deref().unwrap_or("(untitled)")),
        row.prospect.as_deref().unwrap_or("–"),
        row.label,
        row.source,
        if row.is_override { "yes" } else { "" },
      );
    }
  }
  md
}

fn escape_cell(s: &str) -> String { s.replace('|', "\\|") }

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;
  use crate::{
    call::DateRange,
    lifecycle::Source,
    metrics::{AuditRow, MetricsCalculator, MetricsInput, MetricsOptions},
  };

  fn result_with_row(title: &str) -> MetricsResult {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
    let mut result = MetricsCalculator::default()
      .compute_metrics(&MetricsInput::default(), MetricsOptions::default())
      .for_request(Some("rep@acme.io".into()), DateRange::new(start, end).unwrap());
    result.rows.push(AuditRow {
      kind:           RowKind::Call,
      id:             "c1".into(),
      title:          Some(title.into()),
      date:           start,
      rep:            "rep@acme.io".into(),
      prospect:       Some("pat@lead.com".into()),
      label:          "active".into(),
      source:         Source::Subscription,
      raw_status:     "active".into(),
      is_override:    false,
      days_to_signup: Some(7),
    });
    result
  }

  #[test]
  fn csv_has_header_and_quotes_fields() {
    let csv = to_csv(&result_with_row("Demo, \"final\""));
    let mut lines = csv.split("\r\n");
    assert_eq!(lines.next(), Some(CSV_HEADER.join(",").as_str()));
    let row = lines.next().unwrap();
    assert!(row.starts_with("call,c1,\"Demo, \"\"final\"\"\","), "{row}");
    assert!(row.ends_with(",subscription,active,false,7"), "{row}");
  }

  #[test]
  fn markdown_contains_summary_and_rows() {
    let md = to_markdown(&result_with_row("Discovery | Contoso"));
    assert!(md.contains("**Rep:** rep@acme.io"));
    assert!(md.contains("**Period:** 2024-01-01 – 2024-01-31"));
    assert!(md.contains("| Signup rate | 0% |"));
    assert!(md.contains("| Avg. days to signup | n/a |"));
    assert!(md.contains("Discovery \\| Contoso"));
  }

  #[test]
  fn json_is_the_result_verbatim() {
    let result = result_with_row("Demo");
    let json = to_json(&result).unwrap();
    let back: MetricsResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back, result);
  }
}
