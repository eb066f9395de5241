//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGINT (Ctrl-C) → cancel the pending connection attempt
//! ```
//!
//! # Design Decisions
//! - Cancellation flows through a `CancellationToken`, never by killing tasks

pub mod signals;

pub use signals::cancel_on_interrupt;
