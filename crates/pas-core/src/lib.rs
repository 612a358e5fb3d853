//! Core domain + application logic for PTT Auto Sign.
//!
//! This crate is intentionally transport-agnostic. The BBS terminal client and
//! the Telegram notifier live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod ports;
pub mod signer;
pub mod utils;

pub use errors::{Error, Result};
