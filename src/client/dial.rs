//! Dial-path selection and the background dial task.
//!
//! # Responsibilities
//! - Choose between a direct dial and a SOCKS dial from configuration
//! - Compose proxy address, authentication, destination, TLS and SNI into one
//!   plan that runs as a single unit of background work
//! - Capture dial failures on the shared wait record so a pending greeting
//!   wait wakes early with the real cause

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::{ProxyConfig, ProxyType};
use crate::error::DialError;
use crate::net::{open_direct, AttemptId, Credentials, Destination, SocksDial, SocksHandshake, TlsContext, Transport};
use crate::observability::metrics;
use crate::resilience::WaitState;

/// Dial straight to the destination.
#[derive(Debug, Clone)]
pub struct DirectDial {
    pub destination: Destination,
    pub tls: Option<TlsContext>,
    pub server_name: Option<String>,
}

/// The connection attempt to schedule.
#[derive(Debug, Clone)]
pub enum DialPlan {
    Direct(DirectDial),
    Socks(SocksDial),
}

impl DialPlan {
    /// Metric and log label for the path taken.
    pub fn path(&self) -> &'static str {
        match self {
            DialPlan::Direct(_) => "direct",
            DialPlan::Socks(dial) => dial.handshake.name(),
        }
    }

    /// SNI sent to the destination, if TLS is used.
    pub fn server_name(&self) -> Option<&str> {
        match self {
            DialPlan::Direct(dial) => dial.server_name.as_deref(),
            DialPlan::Socks(dial) => dial.server_name.as_deref(),
        }
    }

    pub async fn open(&self) -> Result<Transport, DialError> {
        match self {
            DialPlan::Direct(dial) => {
                open_direct(&dial.destination, dial.tls.as_ref(), dial.server_name.as_deref()).await
            }
            DialPlan::Socks(dial) => dial.open().await,
        }
    }
}

/// Build the plan for one attempt.
///
/// Authentication is attached only when a username is configured; a password
/// on its own never triggers it. SNI is the destination host whenever TLS is
/// in use.
pub fn plan_dial(destination: &Destination, proxy: &ProxyConfig, tls: Option<TlsContext>) -> DialPlan {
    let server_name = tls.as_ref().map(|_| destination.host.clone());

    let handshake = match proxy.proxy_type {
        ProxyType::None => {
            return DialPlan::Direct(DirectDial {
                destination: destination.clone(),
                tls,
                server_name,
            })
        }
        ProxyType::Socks4 => SocksHandshake::Socks4 {
            user_id: proxy.auth().map(|(username, _)| username.to_string()),
        },
        ProxyType::Socks5 => SocksHandshake::Socks5 {
            auth: proxy.auth().map(|(username, password)| Credentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
        },
    };

    if !proxy.has_auth() && proxy.password.is_some() {
        tracing::warn!(proxy = %proxy.endpoint(), "Proxy password set without username, connecting anonymously");
    } else if proxy.proxy_type == ProxyType::Socks4 && proxy.password.is_some() {
        tracing::debug!(proxy = %proxy.endpoint(), "SOCKS4 has no passwords, ignoring it");
    }

    DialPlan::Socks(SocksDial {
        proxy: Destination::new(proxy.address.clone(), proxy.port),
        handshake,
        destination: destination.clone(),
        remote_resolve: proxy.resolve_remotely,
        tls,
        server_name,
    })
}

/// How a background dial ended, when it did not fail outright.
pub enum DialOutcome {
    /// The transport is open.
    Established(Transport),
    /// The dial failed and the failure went to the pending waiter.
    Reported,
}

impl fmt::Debug for DialOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialOutcome::Established(_) => f.write_str("Established(..)"),
            DialOutcome::Reported => f.write_str("Reported"),
        }
    }
}

/// Run `dial`, routing a failure to the waiter registered on `state`.
///
/// With a waiter registered the failure is recorded and the waiter released
/// and the task ends quietly. Without one the failure is the task's result.
pub async fn guarded<F>(state: Arc<WaitState>, dial: F) -> Result<DialOutcome, DialError>
where
    F: Future<Output = Result<Transport, DialError>>,
{
    match dial.await {
        Ok(transport) => Ok(DialOutcome::Established(transport)),
        Err(e) => {
            if state.report_failure(e.clone()) {
                tracing::debug!(error = %e, "Dial failed, reported to pending wait");
                Ok(DialOutcome::Reported)
            } else {
                tracing::error!(error = %e, "Dial failed with no pending wait");
                Err(e)
            }
        }
    }
}

/// Schedule the plan as background work.
pub fn spawn_dial(
    id: AttemptId,
    plan: DialPlan,
    state: Arc<WaitState>,
) -> JoinHandle<Result<DialOutcome, DialError>> {
    let span = tracing::info_span!("dial", attempt = %id, path = plan.path());
    tokio::spawn(
        async move {
            let started = Instant::now();
            let result = guarded(state, plan.open()).await;
            let outcome = match &result {
                Ok(DialOutcome::Established(_)) => "ok",
                Ok(DialOutcome::Reported) => "reported",
                Err(_) => "error",
            };
            metrics::record_dial(plan.path(), outcome, started.elapsed());
            result
        }
        .instrument(span),
    )
}
