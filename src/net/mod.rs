//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Direct:   transport.rs (TCP connect) → tls.rs (optional handshake) → Transport
//! Proxied:  proxy.rs (TCP connect to proxy → SOCKS4/5 handshake → tunnel)
//!               → tls.rs (optional handshake, SNI = destination host) → Transport
//!
//! Attempt phases (connection.rs):
//!     Idle → Dialing → GreetingWait → Ready | Failed
//! ```
//!
//! # Design Decisions
//! - Every transport is boxed behind one trait object so engines stay
//!   independent of the dial path
//! - TLS is optional and handled transparently on both paths

pub mod connection;
pub mod proxy;
pub mod tls;
pub mod transport;

pub use connection::{AttemptId, AttemptPhase};
pub use proxy::{Credentials, SocksDial, SocksHandshake};
pub use tls::TlsContext;
pub use transport::{open_direct, AsyncStream, Destination, Transport};
