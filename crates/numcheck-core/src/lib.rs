//! Core domain + application logic for the number checker.
//!
//! This crate is intentionally transport-agnostic. The HTTP client and the
//! command-line front-end live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod normalize;
pub mod oracle;
pub mod ports;
pub mod relay;
pub mod store;
pub mod utils;

pub use errors::{Error, Result};
