//! [`SqliteStore`], the SQLite implementation of every collaborator trait.

use std::{
  collections::{HashMap, HashSet},
  path::Path,
};

use chrono::{DateTime, Utc};
use closerate_core::{
  call::Call,
  lifecycle::{EventSnapshot, Override, OverrideStatus, SubscriptionSnapshot},
  metrics::ManualClose,
  prospect::ProspectKey,
  store::{
    CallRepository, EventLogSource, ExclusionStore, ManualCloseStore,
    OverrideStore, Source, SubscriptionSource,
  },
};
use rusqlite::OptionalExtension as _;

use crate::{
  Error, Result,
  encode::{
    RawCall, RawEvent, RawManualClose, RawOverride, RawSubscription, encode_dt,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A closerate store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Enrichment-side writers ───────────────────────────────────────────────

  /// Insert a call, or replace it and its participants if the id exists.
  /// Re-inserting a soft-deleted call revives it.
  pub async fn insert_call(&self, call: &Call) -> Result<()> {
    let call_id = call.id.clone();
    let title = call.title.clone();
    let started_at = encode_dt(call.datetime);
    let rep = call.rep.clone();
    let duration = call.duration_seconds;
    let matched_email = call.matched_email.clone();
    let participants: Vec<(Option<String>, Option<String>)> = call
      .participants
      .iter()
      .map(|p| (p.name.clone(), p.email.clone()))
      .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO calls (
             call_id, title, started_at, rep, duration_seconds, matched_email
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT(call_id) DO UPDATE SET
             title            = excluded.title,
             started_at       = excluded.started_at,
             rep              = excluded.rep,
             duration_seconds = excluded.duration_seconds,
             matched_email    = excluded.matched_email,
             deleted_at       = NULL",
          rusqlite::params![call_id, title, started_at, rep, duration, matched_email],
        )?;
        tx.execute(
          "DELETE FROM participants WHERE call_id = ?1",
          rusqlite::params![call_id],
        )?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO participants (call_id, position, name, email)
             VALUES (?1, ?2, ?3, ?4)",
          )?;
          for (position, (name, email)) in participants.iter().enumerate() {
            stmt.execute(rusqlite::params![call_id, position as i64, name, email])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Hide a call from every read. Returns whether a live call was deleted.
  pub async fn soft_delete_call(&self, call_id: &str) -> Result<bool> {
    let call_id = call_id.to_owned();
    let now = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE calls SET deleted_at = ?2 WHERE call_id = ?1 AND deleted_at IS NULL",
          rusqlite::params![call_id, now],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  /// Replace the cached billing snapshot for `prospect`.
  pub async fn put_subscription(
    &self,
    prospect: &ProspectKey,
    snapshot: &SubscriptionSnapshot,
  ) -> Result<()> {
    let key = prospect.as_str().to_owned();
    let matched = snapshot.matched;
    let status = snapshot.status.as_ref().to_owned();
    let signup_date = snapshot.signup_date.map(encode_dt);
    let now = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO subscriptions (prospect_key, matched, status, signup_date, refreshed_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT(prospect_key) DO UPDATE SET
             matched      = excluded.matched,
             status       = excluded.status,
             signup_date  = excluded.signup_date,
             refreshed_at = excluded.refreshed_at",
          rusqlite::params![key, matched, status, signup_date, now],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Append a parsed lifecycle event. Reads return the most recent one.
  pub async fn put_event(
    &self,
    prospect: &ProspectKey,
    event: &EventSnapshot,
  ) -> Result<()> {
    let key = prospect.as_str().to_owned();
    let status = event.status.as_ref().to_owned();
    let occurred_at = encode_dt(event.timestamp);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO events (prospect_key, status, occurred_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![key, status, occurred_at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

impl Source for SqliteStore {
  type Error = Error;
}

// ─── Calls ───────────────────────────────────────────────────────────────────

impl CallRepository for SqliteStore {
  async fn list_sales_candidates(
    &self,
    rep: Option<&str>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Vec<Call>> {
    let rep = rep.map(str::to_owned);
    let start = encode_dt(start);
    let end = encode_dt(end);

    let raws: Vec<RawCall> = self
      .conn
      .call(move |conn| {
        let mut calls = conn.prepare(
          "SELECT call_id, title, started_at, rep, duration_seconds, matched_email
           FROM calls
           WHERE deleted_at IS NULL
             AND started_at >= ?1
             AND started_at <= ?2
             AND (?3 IS NULL OR rep = ?3 COLLATE NOCASE)
           ORDER BY started_at, call_id",
        )?;
        let mut rows = calls
          .query_map(rusqlite::params![start, end, rep], |row| {
            Ok(RawCall {
              call_id:          row.get(0)?,
              title:            row.get(1)?,
              started_at:       row.get(2)?,
              rep:              row.get(3)?,
              duration_seconds: row.get(4)?,
              matched_email:    row.get(5)?,
              participants:     Vec::new(),
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut participants = conn.prepare(
          "SELECT name, email FROM participants WHERE call_id = ?1 ORDER BY position",
        )?;
        for raw in &mut rows {
          raw.participants = participants
            .query_map(rusqlite::params![raw.call_id], |row| {
              Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        }
        Ok(rows)
      })
      .await?;

    tracing::debug!(count = raws.len(), "loaded candidate calls");
    raws.into_iter().map(RawCall::into_call).collect()
  }

  async fn list_reps(&self) -> Result<Vec<String>> {
    let reps = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT rep FROM calls WHERE deleted_at IS NULL ORDER BY rep",
        )?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(reps)
  }
}

// ─── Overrides ───────────────────────────────────────────────────────────────

impl OverrideStore for SqliteStore {
  async fn get_all(&self) -> Result<HashMap<String, Override>> {
    let raws: Vec<RawOverride> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT call_id, status, notes, updated_at FROM overrides")?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawOverride {
              call_id:    row.get(0)?,
              status:     row.get(1)?,
              notes:      row.get(2)?,
              updated_at: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|raw| raw.into_override().map(|o| (o.call_id.clone(), o)))
      .collect()
  }

  async fn set_override(
    &self,
    call_id: String,
    status: OverrideStatus,
    notes: Option<String>,
  ) -> Result<Override> {
    let override_ = Override {
      call_id,
      status,
      notes,
      updated_at: Utc::now(),
    };

    let call_id = override_.call_id.clone();
    let status = override_.status.as_ref().to_owned();
    let notes = override_.notes.clone();
    let updated_at = encode_dt(override_.updated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO overrides (call_id, status, notes, updated_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(call_id) DO UPDATE SET
             status     = excluded.status,
             notes      = excluded.notes,
             updated_at = excluded.updated_at",
          rusqlite::params![call_id, status, notes, updated_at],
        )?;
        Ok(())
      })
      .await?;

    tracing::info!(call = %override_.call_id, status = %override_.status, "override set");
    Ok(override_)
  }

  async fn clear_override(&self, call_id: String) -> Result<bool> {
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM overrides WHERE call_id = ?1",
          rusqlite::params![call_id],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }
}

// ─── Lifecycle snapshots ─────────────────────────────────────────────────────

impl SubscriptionSource for SqliteStore {
  async fn get_status(
    &self,
    prospect: &ProspectKey,
  ) -> Result<Option<SubscriptionSnapshot>> {
    let key = prospect.as_str().to_owned();

    let raw: Option<RawSubscription> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT matched, status, signup_date FROM subscriptions
               WHERE prospect_key = ?1",
              rusqlite::params![key],
              |row| {
                Ok(RawSubscription {
                  matched:     row.get(0)?,
                  status:      row.get(1)?,
                  signup_date: row.get(2)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSubscription::into_snapshot).transpose()
  }
}

impl EventLogSource for SqliteStore {
  async fn get_latest_status(
    &self,
    prospect: &ProspectKey,
  ) -> Result<Option<EventSnapshot>> {
    let key = prospect.as_str().to_owned();

    let raw: Option<RawEvent> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT status, occurred_at FROM events
               WHERE prospect_key = ?1
               ORDER BY occurred_at DESC, event_id DESC
               LIMIT 1",
              rusqlite::params![key],
              |row| {
                Ok(RawEvent {
                  status:      row.get(0)?,
                  occurred_at: row.get(1)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEvent::into_snapshot).transpose()
  }
}

// ─── Exclusions ──────────────────────────────────────────────────────────────

impl ExclusionStore for SqliteStore {
  async fn get_excluded_call_ids(&self) -> Result<HashSet<String>> {
    let ids = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT call_id FROM exclusions")?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<HashSet<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(ids)
  }

  async fn exclude_call(&self, call_id: String, reason: Option<String>) -> Result<()> {
    let now = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO exclusions (call_id, reason, excluded_at) VALUES (?1, ?2, ?3)
           ON CONFLICT(call_id) DO UPDATE SET reason = excluded.reason",
          rusqlite::params![call_id, reason, now],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn include_call(&self, call_id: String) -> Result<bool> {
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM exclusions WHERE call_id = ?1",
          rusqlite::params![call_id],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }
}

// ─── Manual closes ───────────────────────────────────────────────────────────

impl ManualCloseStore for SqliteStore {
  async fn list(
    &self,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    rep: Option<&str>,
  ) -> Result<Vec<ManualClose>> {
    let rep = rep.map(str::to_owned);
    let start = encode_dt(start);
    let end = encode_dt(end);

    let raws: Vec<RawManualClose> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT close_id, rep, closed_at, prospect_email, notes
           FROM manual_closes
           WHERE closed_at >= ?1
             AND closed_at <= ?2
             AND (?3 IS NULL OR rep = ?3 COLLATE NOCASE)
           ORDER BY closed_at, close_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![start, end, rep], |row| {
            Ok(RawManualClose {
              close_id:       row.get(0)?,
              rep:            row.get(1)?,
              closed_at:      row.get(2)?,
              prospect_email: row.get(3)?,
              notes:          row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawManualClose::into_manual_close).collect()
  }

  async fn record_manual_close(&self, close: ManualClose) -> Result<ManualClose> {
    let id = close.id.clone();
    let rep = close.rep.clone();
    let closed_at = encode_dt(close.closed_at);
    let prospect_email = close.prospect_email.clone();
    let notes = close.notes.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO manual_closes (close_id, rep, closed_at, prospect_email, notes)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id, rep, closed_at, prospect_email, notes],
        )?;
        Ok(())
      })
      .await?;

    tracing::info!(close = %close.id, rep = %close.rep, "manual close recorded");
    Ok(close)
  }
}
