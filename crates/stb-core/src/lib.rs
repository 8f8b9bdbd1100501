//! Core domain + application logic for the support ticket relay bot.
//!
//! This crate is intentionally framework-agnostic. Telegram / locale files /
//! attachment storage live behind ports (traits) implemented in adapter
//! crates or thin collaborators.

pub mod config;
pub mod confirm;
pub mod domain;
pub mod errors;
pub mod eventlog;
pub mod locales;
pub mod logging;
pub mod media;
pub mod messaging;
pub mod ratelimit;
pub mod router;
pub mod session;
pub mod store;
pub mod tickets;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::{Error, Result};
