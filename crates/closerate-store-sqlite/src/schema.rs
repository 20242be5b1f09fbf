//! SQL schema for the closerate SQLite store.
//!
//! Executed once at connection startup. Timestamps are fixed-width RFC 3339
//! strings so that range filters can compare them as text.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Written by call ingestion; soft-deleted, never removed.
CREATE TABLE IF NOT EXISTS calls (
    call_id          TEXT PRIMARY KEY,
    title            TEXT,
    started_at       TEXT NOT NULL,
    rep              TEXT NOT NULL,
    duration_seconds INTEGER NOT NULL DEFAULT 0,
    matched_email    TEXT,
    deleted_at       TEXT
);

CREATE TABLE IF NOT EXISTS participants (
    call_id  TEXT NOT NULL REFERENCES calls(call_id),
    position INTEGER NOT NULL,
    name     TEXT,
    email    TEXT,
    PRIMARY KEY (call_id, position)
);

-- At most one analyst decision per call; later writes replace earlier ones.
CREATE TABLE IF NOT EXISTS overrides (
    call_id    TEXT PRIMARY KEY,
    status     TEXT NOT NULL,   -- signed_up | active | churned | team | no_close
    notes      TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS exclusions (
    call_id     TEXT PRIMARY KEY,
    reason      TEXT,
    excluded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS manual_closes (
    close_id       TEXT PRIMARY KEY,
    rep            TEXT NOT NULL,
    closed_at      TEXT NOT NULL,
    prospect_email TEXT,
    notes          TEXT
);

-- Enrichment caches, keyed by normalised prospect key.
CREATE TABLE IF NOT EXISTS subscriptions (
    prospect_key TEXT PRIMARY KEY,
    matched      INTEGER NOT NULL,
    status       TEXT NOT NULL,
    signup_date  TEXT,
    refreshed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    event_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    prospect_key TEXT NOT NULL,
    status       TEXT NOT NULL,
    occurred_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS calls_started_idx      ON calls(started_at);
CREATE INDEX IF NOT EXISTS calls_rep_idx          ON calls(rep);
CREATE INDEX IF NOT EXISTS manual_closes_at_idx   ON manual_closes(closed_at);
CREATE INDEX IF NOT EXISTS events_prospect_idx    ON events(prospect_key, occurred_at);

PRAGMA user_version = 1;
";
