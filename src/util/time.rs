//! Time formatting utilities.

use chrono::{DateTime, Utc};

fn plural(n: i64) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// Format a countdown from `now` to a future time.
#[must_use]
pub fn format_countdown(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = target.signed_duration_since(now);

    if duration.num_seconds() <= 0 {
        return "now".to_string();
    }

    let hours = duration.num_hours();
    let minutes = duration.num_minutes() % 60;

    if hours > 24 {
        let days = hours / 24;
        format!("in {days} day{}", plural(days))
    } else if hours > 0 {
        format!("in {hours}h {minutes}m")
    } else if minutes > 0 {
        format!("in {minutes}m")
    } else {
        let seconds = duration.num_seconds();
        format!("in {seconds}s")
    }
}

/// Format a time relative to `now` (past or future).
#[must_use]
pub fn format_relative_time(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(target);

    if duration.num_seconds().abs() < 60 {
        return "just now".to_string();
    }

    let minutes = duration.num_minutes().abs();
    let hours = duration.num_hours().abs();
    let days = duration.num_days().abs();

    let suffix = if duration.num_seconds() > 0 {
        "ago"
    } else {
        "from now"
    };

    if days > 0 {
        format!("{days} day{} {suffix}", plural(days))
    } else if hours > 0 {
        format!("{hours} hour{} {suffix}", plural(hours))
    } else {
        format!("{minutes} minute{} {suffix}", plural(minutes))
    }
}

/// Format a latency in milliseconds.
#[must_use]
pub fn format_latency(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        #[allow(clippy::cast_precision_loss)]
        let secs = ms as f64 / 1000.0;
        format!("{secs:.1}s")
    }
}
