//! Connection attempt identity and state machine.
//!
//! # Responsibilities
//! - Generate unique attempt IDs for tracing
//! - Track the phase of a single connection attempt
//!
//! ```text
//! Idle → Dialing → GreetingWait → Ready
//!  │       │            │
//!  └───────┴────────────┴──→ Failed (TLS setup, dial error, timeout, cancellation)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global atomic counter for attempt IDs.
/// Relaxed ordering is enough since we only need uniqueness.
static ATTEMPT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttemptId(u64);

impl AttemptId {
    pub fn new() -> Self {
        Self(ATTEMPT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt-{}", self.0)
    }
}

/// Phase of a single connection attempt. `Ready` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttemptPhase {
    /// Nothing started yet.
    #[default]
    Idle,
    /// Dial running in the background.
    Dialing,
    /// Caller is waiting for the server greeting.
    GreetingWait,
    /// Greeting received; the session is usable.
    Ready,
    /// Timed out, dial failed, or cancelled. No retry.
    Failed,
}

impl AttemptPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptPhase::Ready | AttemptPhase::Failed)
    }

    /// Whether moving to `next` follows the attempt state machine.
    pub fn can_advance_to(&self, next: AttemptPhase) -> bool {
        use AttemptPhase::*;
        matches!(
            (self, next),
            (Idle, Dialing)
                | (Idle, Failed)
                | (Dialing, GreetingWait)
                | (Dialing, Failed)
                | (GreetingWait, Ready)
                | (GreetingWait, Failed)
        )
    }
}

impl fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptPhase::Idle => "idle",
            AttemptPhase::Dialing => "dialing",
            AttemptPhase::GreetingWait => "greeting-wait",
            AttemptPhase::Ready => "ready",
            AttemptPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}
