//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Establisher, dialers, bounded waits produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, histograms via the metrics facade)
//!
//! Consumers:
//!     → stdout (fmt layer installed by the binary)
//!     → whatever metrics recorder the embedding application installs
//! ```
//!
//! # Design Decisions
//! - Every connection attempt carries its attempt id in log fields
//! - The library never installs a global subscriber or recorder itself;
//!   only the binary does

pub mod logging;
pub mod metrics;
