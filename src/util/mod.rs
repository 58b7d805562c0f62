//! Utility functions.

pub mod time;

pub use time::{format_countdown, format_latency, format_relative_time};
