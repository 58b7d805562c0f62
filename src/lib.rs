//! ocrmux - OCR text enhancement router
//!
//! Routes OCR text cleanup across several LLM backends with cooldown-aware
//! fallback, and tracks document processing jobs for an HTTP front end.

// Note: deny (not forbid) to allow #[allow(unsafe_code)] in test helpers for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unused_async)]

pub mod cli;
pub mod core;
pub mod error;
pub mod providers;
pub mod server;
pub mod storage;
pub mod util;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ExitCode, OcrmuxError, Result};

// Re-export test utilities for external test crates
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
