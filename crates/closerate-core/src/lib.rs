//! Core types and trait definitions for closing-rate analytics.
//!
//! Classification, prospect deduplication, lifecycle resolution and the
//! metrics calculator live here, free of HTTP and database dependencies.
//! Storage backends implement the traits in [`store`].

#![allow(async_fn_in_trait)]

pub mod call;
pub mod classify;
pub mod dedupe;
pub mod error;
pub mod export;
pub mod job;
pub mod lifecycle;
pub mod metrics;
pub mod prospect;
pub mod service;
pub mod store;

pub use error::{Error, Result};
