//! Prospect keys: the identity calls are grouped and matched under.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::call::Call;

const SYNTHETIC_PREFIX: &str = "call:";

/// Canonical identifier for the external contact a call was held with.
///
/// Either a normalised email address or, when no usable address exists, a
/// synthetic key unique to the call so it is never merged with another.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ProspectKey(String);

impl ProspectKey {
  /// Build a key from an email address. Returns `None` if the address does
  /// not normalise to something usable.
  pub fn from_email(email: &str) -> Option<Self> {
    normalize_email(email).map(Self)
  }

  pub fn synthetic(call_id: &str) -> Self {
    Self(format!("{SYNTHETIC_PREFIX}{call_id}"))
  }

  /// Synthetic keys have no counterpart in any lifecycle source.
  pub fn is_synthetic(&self) -> bool { self.0.starts_with(SYNTHETIC_PREFIX) }

  pub fn as_str(&self) -> &str { &self.0 }

  /// The email behind this key, or `None` for synthetic keys.
  pub fn email(&self) -> Option<&str> {
    (!self.is_synthetic()).then_some(self.0.as_str())
  }
}

impl fmt::Display for ProspectKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Lowercase, trim, and strip a `mailto:` prefix. Anything without exactly
/// one `@` separating a non-empty local part from a dotted domain is
/// rejected, as is a `:` in the local part (it would collide with synthetic
/// keys).
pub fn normalize_email(raw: &str) -> Option<String> {
  let lowered = raw.trim().to_lowercase();
  let lowered = lowered.strip_prefix("mailto:").unwrap_or(&lowered).trim();

  let (local, domain) = lowered.split_once('@')?;
  if local.is_empty()
    || local.contains(':')
    || domain.contains('@')
    || !domain.contains('.')
    || domain.starts_with('.')
    || domain.ends_with('.')
    || lowered.chars().any(char::is_whitespace)
  {
    return None;
  }
  Some(lowered.to_owned())
}

// ─── Internal directory ──────────────────────────────────────────────────────

/// Addresses that belong to the selling side and must never become a
/// prospect key: whole internal domains plus individual rep aliases (e.g. a
/// personal address a rep sometimes joins from).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InternalDirectory {
  #[serde(default)]
  pub internal_domains: Vec<String>,
  #[serde(default)]
  pub rep_aliases:      Vec<String>,
}

impl InternalDirectory {
  pub fn new(
    internal_domains: impl IntoIterator<Item = impl Into<String>>,
    rep_aliases: impl IntoIterator<Item = impl Into<String>>,
  ) -> Self {
    Self {
      internal_domains: internal_domains
        .into_iter()
        .map(|d| d.into().trim().trim_start_matches('@').to_lowercase())
        .filter(|d| !d.is_empty())
        .collect(),
      rep_aliases:      rep_aliases
        .into_iter()
        .filter_map(|a| normalize_email(&a.into()))
        .collect(),
    }
  }

  /// Whether a normalised address is on the selling side.
  pub fn is_internal(&self, normalized: &str) -> bool {
    if self.rep_aliases.iter().any(|a| a == normalized) {
      return true;
    }
    let Some((_, domain)) = normalized.split_once('@') else {
      return false;
    };
    self.internal_domains.iter().any(|d| {
      domain == d
        || domain
          .strip_suffix(d.as_str())
          .is_some_and(|rest| rest.ends_with('.'))
    })
  }

  /// Derive the prospect key for `call`.
  ///
  /// Order: the previously matched email, then the first external
  /// participant address, then a synthetic per-call key. The call's own rep
  /// is never external, even when the directory is empty.
  pub fn prospect_key(&self, call: &Call) -> ProspectKey {
    if let Some(key) = call
      .matched_email
      .as_deref()
      .and_then(ProspectKey::from_email)
    {
      return key;
    }

    let rep = normalize_email(&call.rep);
    call
      .participants
      .iter()
      .filter_map(|p| p.email.as_deref())
      .filter_map(normalize_email)
      .find(|email| {
        rep.as_deref() != Some(email.as_str()) && !self.is_internal(email)
      })
      .map(ProspectKey)
      .unwrap_or_else(|| ProspectKey::synthetic(&call.id))
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::call::Participant;

  fn directory() -> InternalDirectory {
    InternalDirectory::new(["acme.io"], ["jordan.personal@gmail.com"])
  }

  fn call(participants: &[&str], matched: Option<&str>) -> Call {
    Call {
      id:               "c1".into(),
      title:            None,
      datetime:         Utc::now(),
      rep:              "jordan@acme.io".into(),
      duration_seconds: 1800,
      participants:     participants
        .iter()
        .map(|e| Participant::with_email(*e))
        .collect(),
      matched_email:    matched.map(str::to_owned),
    }
  }

  #[test]
  fn normalizes_case_whitespace_and_mailto() {
    assert_eq!(
      normalize_email("  MailTo:Pat@Example.COM ").as_deref(),
      Some("pat@example.com")
    );
    assert_eq!(normalize_email(" Pat@Example.com ").as_deref(), Some("pat@example.com"));
  }

  #[test]
  fn rejects_unusable_addresses() {
    for raw in [
      "",
      "pat",
      "@example.com",
      "pat@",
      "pat@localhost",
      "a@b@c.com",
      "pat @x.com",
      "call:pat@x.com",
      "mailto:call:pat@x.com",
    ] {
      assert!(normalize_email(raw).is_none(), "{raw:?} should be rejected");
    }
  }

  #[test]
  fn internal_domain_and_subdomain() {
    let dir = directory();
    assert!(dir.is_internal("sam@acme.io"));
    assert!(dir.is_internal("sam@eu.acme.io"));
    assert!(!dir.is_internal("sam@notacme.io"));
    assert!(dir.is_internal("jordan.personal@gmail.com"));
    assert!(!dir.is_internal("someone@gmail.com"));
  }

  #[test]
  fn matched_email_wins() {
    let key = directory().prospect_key(&call(&["lead@prospect.com"], Some("Owner@Prospect.com")));
    assert_eq!(key.as_str(), "owner@prospect.com");
  }

  #[test]
  fn skips_internal_participants() {
    let key = directory().prospect_key(&call(
      &["jordan@acme.io", "jordan.personal@gmail.com", "lead@prospect.com"],
      None,
    ));
    assert_eq!(key.as_str(), "lead@prospect.com");
    assert!(!key.is_synthetic());
  }

  #[test]
  fn falls_back_to_synthetic_key() {
    let key = directory().prospect_key(&call(&["jordan@acme.io", "not-an-email"], None));
    assert!(key.is_synthetic());
    assert_eq!(key.as_str(), "call:c1");
    assert_eq!(key.email(), None);
  }

  #[test]
  fn rep_address_is_skipped_without_directory() {
    let dir = InternalDirectory::default();
    let key = dir.prospect_key(&call(&["Jordan@Acme.io", "lead@prospect.com"], None));
    assert_eq!(key.as_str(), "lead@prospect.com");

    let key = dir.prospect_key(&call(&["jordan@acme.io"], None));
    assert!(key.is_synthetic());
  }

  #[test]
  fn email_keys_are_never_synthetic() {
    let key = ProspectKey::from_email("calls@vendor.com").unwrap();
    assert!(!key.is_synthetic());
    assert_eq!(key.email(), Some("calls@vendor.com"));
    assert!(ProspectKey::from_email("call:c1@vendor.com").is_none());
  }
}
