//! Metrics collection.
//!
//! # Metrics
//! - `socks_imap_dial_total` (counter): dial attempts by path (direct, socks4,
//!   socks5) and outcome (ok, error, reported)
//! - `socks_imap_dial_duration_seconds` (histogram): time to an open transport
//! - `socks_imap_wait_total` (counter): bounded waits by outcome
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder the
//!   calls are no-ops

use std::time::Duration;

/// Record the end of a dial attempt.
pub fn record_dial(path: &'static str, outcome: &'static str, elapsed: Duration) {
    ::metrics::counter!("socks_imap_dial_total", "path" => path, "outcome" => outcome).increment(1);
    if outcome == "ok" {
        ::metrics::histogram!("socks_imap_dial_duration_seconds", "path" => path)
            .record(elapsed.as_secs_f64());
    }
}

/// Record the end of a bounded wait.
pub fn record_wait(outcome: &'static str) {
    ::metrics::counter!("socks_imap_wait_total", "outcome" => outcome).increment(1);
}
