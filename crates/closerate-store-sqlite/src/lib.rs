//! SQLite backend for closerate.
//!
//! Holds the call log, analyst overrides, exclusions and manual closes, plus
//! the subscription and event-log snapshot caches written by enrichment.
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
