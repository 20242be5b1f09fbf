//! Call-title classification.
//!
//! A title is run through an ordered list of [`Rule`]s; the first rule that
//! produces a verdict wins. The order is fixed: denylist, then the
//! two-person-name pattern, then keyword scoring, then the fallback. Only
//! the keyword weights and the extra denylist entries are configurable.

use std::{collections::BTreeMap, sync::OnceLock};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::Result;

// ─── Verdicts ────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
  Sales,
  NotSales,
  ReviewNeeded,
}

/// Which rule produced a [`Classification`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Reason {
  DenylistMatch,
  NameAndNamePattern,
  SalesKeywords,
  NoConfidentMatch,
  EmptyTitle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
  pub label:      Label,
  /// 0–100.
  pub confidence: u8,
  pub reason:     Reason,
}

impl Classification {
  const fn new(label: Label, confidence: u8, reason: Reason) -> Self {
    Self { label, confidence, reason }
  }

  pub fn is_sales(&self) -> bool { self.label == Label::Sales }
}

const DENYLISTED: Classification =
  Classification::new(Label::NotSales, 95, Reason::DenylistMatch);
const NAME_AND_NAME: Classification =
  Classification::new(Label::Sales, 90, Reason::NameAndNamePattern);
const FALLBACK: Classification =
  Classification::new(Label::ReviewNeeded, 50, Reason::NoConfidentMatch);
const EMPTY: Classification =
  Classification::new(Label::ReviewNeeded, 0, Reason::EmptyTitle);

/// Keyword verdicts never claim more certainty than the name pattern.
const MAX_KEYWORD_CONFIDENCE: u32 = 85;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Tunable parts of the classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
  /// Points awarded when a title contains a word starting with the term.
  pub keyword_weights: BTreeMap<String, u32>,
  /// Minimum keyword score for a `SALES` verdict.
  pub threshold:       u32,
  /// Extra case-insensitive regex patterns appended to the denylist.
  pub extra_denylist:  Vec<String>,
  /// Company or product names whose mention marks a call as internal.
  pub internal_brands: Vec<String>,
}

impl Default for ClassifierConfig {
  fn default() -> Self {
    let keyword_weights = [
      ("discovery", 80),
      ("demo", 75),
      ("proposal", 75),
      ("pitch", 70),
      ("consult", 70),
      ("intro", 50),
      ("pricing", 40),
      ("sales", 30),
    ]
    .into_iter()
    .map(|(term, points)| (term.to_owned(), points))
    .collect();

    Self {
      keyword_weights,
      threshold: 70,
      extra_denylist: Vec::new(),
      internal_brands: Vec::new(),
    }
  }
}

// ─── Rules ───────────────────────────────────────────────────────────────────

const DENYLIST_PATTERNS: &[&str] = &[
  r"\bcatch[\s-]?up\b",
  r"\bstand[\s-]?up\b",
  r"\b1\s*:\s*1\b|\b1[\s-]on[\s-]1\b|\bone[\s-]on[\s-]one\b",
  r"\bteam\s+sync\b",
  r"\bweekly\b",
  r"\bcheck[\s-]?in\b",
  r"\bretro(?:spective)?\b",
  r"\bsprint\b",
  r"\bstatus\s+update\b",
  r"\bdebrief\b",
  r"\btraining\b",
  r"\bonboarding\b",
  r"\ball[\s-]?hands\b",
  r"\bdev\b",
];

fn builtin_denylist() -> &'static [Regex] {
  static RE: OnceLock<Vec<Regex>> = OnceLock::new();
  RE.get_or_init(|| {
    DENYLIST_PATTERNS
      .iter()
      .map(|p| case_insensitive(p).expect("builtin denylist pattern"))
      .collect()
  })
}

fn re_name_and_name() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  // A name is one or more capitalised tokens; tokens may carry internal
  // periods ("Jamie I.F.").
  RE.get_or_init(|| {
    let token = r"\p{Lu}[\p{L}'’-]*(?:\.\p{Lu}?[\p{L}'’-]*)*\.?";
    let name = format!(r"{token}(?: {token})*");
    Regex::new(&format!(r"^{name} and {name}$")).expect("name pattern")
  })
}

fn case_insensitive(pattern: &str) -> Result<Regex> {
  Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
}

/// One step of the classification chain. Each rule either returns a verdict
/// or defers to the next one.
#[derive(Debug, Clone)]
pub enum Rule {
  Denylist(Vec<Regex>),
  NameAndName(Regex),
  Keywords {
    terms:     Vec<(Regex, u32)>,
    threshold: u32,
  },
}

impl Rule {
  /// `title` must already be whitespace-normalised.
  pub fn evaluate(&self, title: &str) -> Option<Classification> {
    match self {
      Self::Denylist(patterns) => {
        patterns.iter().any(|re| re.is_match(title)).then_some(DENYLISTED)
      }
      Self::NameAndName(re) => re.is_match(title).then_some(NAME_AND_NAME),
      Self::Keywords { terms, threshold } => {
        let score: u32 = terms
          .iter()
          .filter(|(re, _)| re.is_match(title))
          .map(|(_, points)| *points)
          .fold(0u32, u32::saturating_add);
        (score >= *threshold).then(|| {
          let confidence = score.min(MAX_KEYWORD_CONFIDENCE) as u8;
          Classification::new(Label::Sales, confidence, Reason::SalesKeywords)
        })
      }
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::Denylist(_) => "denylist",
      Self::NameAndName(_) => "name_and_name",
      Self::Keywords { .. } => "keywords",
    }
  }
}

// ─── Classifier ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Classifier {
  rules: Vec<Rule>,
}

impl Classifier {
  /// Compile a classifier. Fails only if an extra denylist entry is not a
  /// valid regex.
  pub fn new(config: &ClassifierConfig) -> Result<Self> {
    let mut denylist = builtin_denylist().to_vec();
    for pattern in &config.extra_denylist {
      denylist.push(case_insensitive(pattern)?);
    }
    for brand in config.internal_brands.iter().filter(|b| !b.trim().is_empty()) {
      let escaped = regex::escape(brand.trim());
      denylist.push(case_insensitive(&format!(r"\b{escaped}\b"))?);
    }

    let terms = config
      .keyword_weights
      .iter()
      .filter(|(term, _)| !term.trim().is_empty())
      .map(|(term, points)| {
        let escaped = regex::escape(term.trim());
        Ok((case_insensitive(&format!(r"\b{escaped}\w*"))?, *points))
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      rules: vec![
        Rule::Denylist(denylist),
        Rule::NameAndName(re_name_and_name().clone()),
        Rule::Keywords { terms, threshold: config.threshold },
      ],
    })
  }

  pub fn rules(&self) -> &[Rule] { &self.rules }

  /// Classify a title. Never fails; anything no rule is confident about is
  /// `REVIEW_NEEDED`.
  pub fn classify(&self, title: Option<&str>) -> Classification {
    let normalized = normalize_whitespace(title.unwrap_or_default());
    if normalized.is_empty() {
      return EMPTY;
    }
    self
      .rules
      .iter()
      .find_map(|rule| rule.evaluate(&normalized))
      .unwrap_or(FALLBACK)
  }
}

fn default_classifier() -> &'static Classifier {
  static DEFAULT: OnceLock<Classifier> = OnceLock::new();
  DEFAULT.get_or_init(|| {
    Classifier::new(&ClassifierConfig::default()).expect("default classifier config")
  })
}

impl Default for Classifier {
  fn default() -> Self { default_classifier().clone() }
}

/// Classify with the default configuration.
pub fn classify(title: Option<&str>) -> Classification {
  default_classifier().classify(title)
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
  s.split_whitespace().collect::<Vec<_>>().join(" ")
}
