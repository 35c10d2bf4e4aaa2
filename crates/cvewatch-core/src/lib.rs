//! Core of the CVE watcher.
//!
//! This crate is intentionally framework-agnostic. The feed is reached
//! through the `FeedSource` port and the subscriber through `MessagingPort`;
//! Telegram / Discord live in adapter crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod feed;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod novelty;
pub mod poller;
pub mod security;
pub mod watermark;

pub use errors::{CycleError, Error, Result};
