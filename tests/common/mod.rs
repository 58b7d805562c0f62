//! Shared helpers for integration tests.
//!
//! - `logger`: structured per-test logging

pub mod logger;
