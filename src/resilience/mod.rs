//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Greeting wait (dial + proxy handshake + TLS + server greeting):
//!     → timeouts.rs (one deadline for the whole step, clean cancellation,
//!       dial failures reported through the shared wait record)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; the greeting wait always has a deadline
//!   unless the caller explicitly opts out
//! - No retries: a failed attempt is terminal, callers start a new one

pub mod timeouts;

pub use timeouts::{deadline_from_secs, wait_for, wait_for_with, Operation, WaitState};
