//! Core domain + routing logic for the anonymous relay bot.
//!
//! This crate is intentionally framework-agnostic. Telegram lives behind the
//! `MessagingPort` trait, implemented in the adapter crate.

pub mod actions;
pub mod blocklist;
pub mod config;
pub mod correlation;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod rate_limit;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
