//! Protocol engine seam.
//!
//! # Data Flow
//! ```text
//! Transport (from the establisher)
//!     → ProtocolEngine::from_transport
//!     → ProtocolEngine::wait(&[states])   (bounded by the greeting deadline)
//!     → caller drives the session (login, select, fetch, logout)
//! ```
//!
//! # Design Decisions
//! - The command grammar lives in the engine, not here; the establisher only
//!   needs construction from a transport and a wait on session states
//! - `GreetingEngine` is the minimal engine: it understands the greeting and
//!   hands the buffered transport back for a full engine to take over

use std::fmt;
use std::future::Future;

use crate::error::Result;
use crate::net::Transport;

pub mod greeting;

pub use greeting::GreetingEngine;

/// Session states of a line-oriented mail protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Transport open, no greeting yet.
    Started,
    NonAuthenticated,
    Authenticated,
    Selected,
    Logout,
}

impl SessionState {
    /// States in which a greeting has been received and the session is usable.
    pub const GREETED: [SessionState; 2] = [SessionState::NonAuthenticated, SessionState::Authenticated];
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Started => "STARTED",
            SessionState::NonAuthenticated => "NONAUTH",
            SessionState::Authenticated => "AUTH",
            SessionState::Selected => "SELECTED",
            SessionState::Logout => "LOGOUT",
        };
        f.write_str(name)
    }
}

/// A protocol engine driven over an established transport.
pub trait ProtocolEngine: Send + Sized + 'static {
    /// Take ownership of a freshly opened transport.
    fn from_transport(transport: Transport) -> Self;

    /// Current session state.
    fn state(&self) -> SessionState;

    /// Resolve once the session is in one of `states`.
    fn wait<'a>(&'a mut self, states: &'a [SessionState]) -> impl Future<Output = Result<()>> + Send + 'a;
}
