//! IMAP connection establishment over direct TCP or SOCKS4/SOCKS5 proxies.

pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod session;

pub use client::{Establisher, EstablisherConfig, TlsSource};
pub use config::{ClientConfig, ProxyConfig, ProxyType};
pub use error::{DialError, Error, Result};
pub use session::{GreetingEngine, ProtocolEngine, SessionState};
