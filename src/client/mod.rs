//! Connection establishment.
//!
//! # Data Flow
//! ```text
//! EstablisherConfig
//!     → dial.rs (plan: direct or SOCKS, TLS, SNI; spawned in the background)
//!     → establisher.rs (bounded wait for the server greeting)
//!     → ProtocolEngine in a greeted state
//! ```

pub mod dial;
pub mod establisher;

pub use dial::{plan_dial, spawn_dial, DialOutcome, DialPlan, DirectDial};
pub use establisher::{Establisher, EstablisherConfig, TlsBuilder, TlsSource};
