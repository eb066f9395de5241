//! Connection establisher.
//!
//! # Responsibilities
//! - Turn validated configuration into one connection attempt
//! - Start the dial in the background without blocking the caller
//! - Bound dial, proxy handshake, TLS and the server greeting by one deadline
//! - Leave nothing running after a failed or cancelled attempt
//!
//! # Design Decisions
//! - TLS is a strategy chosen at configuration time (disabled, a prepared
//!   context, or a builder run at connect time), not a subtype
//! - No retries: a failed attempt is terminal, build a new establisher

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::client::dial::{plan_dial, spawn_dial, DialOutcome};
use crate::config::{validate_config, ClientConfig, ConfigError, ProxyConfig};
use crate::error::{DialError, Error, Result};
use crate::net::{AttemptId, AttemptPhase, Destination, TlsContext};
use crate::resilience::{deadline_from_secs, wait_for_with, Operation, WaitState};
use crate::session::{GreetingEngine, ProtocolEngine, SessionState};

/// Builds a TLS context when an attempt starts.
pub type TlsBuilder = fn() -> std::result::Result<TlsContext, ConfigError>;

/// Where the destination's TLS context comes from.
#[derive(Debug, Clone, Default)]
pub enum TlsSource {
    /// Plain connection.
    #[default]
    Disabled,
    /// Use this context.
    Context(TlsContext),
    /// Build a context at connect time.
    Builder(TlsBuilder),
}

impl TlsSource {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, TlsSource::Disabled)
    }

    pub fn resolve(&self) -> std::result::Result<Option<TlsContext>, ConfigError> {
        match self {
            TlsSource::Disabled => Ok(None),
            TlsSource::Context(context) => Ok(Some(context.clone())),
            TlsSource::Builder(build) => build().map(Some),
        }
    }
}

/// Validated settings for one connection attempt.
#[derive(Debug, Clone)]
pub struct EstablisherConfig {
    pub destination: Destination,
    pub proxy: ProxyConfig,
    pub tls: TlsSource,
    /// Deadline for dial + greeting. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl EstablisherConfig {
    /// Direct, plain connection with the default timeout.
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            proxy: ProxyConfig::direct(),
            tls: TlsSource::Disabled,
            timeout: deadline_from_secs(Some(crate::config::schema::DEFAULT_TIMEOUT_SECS)),
        }
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_tls(mut self, context: TlsContext) -> Self {
        self.tls = TlsSource::Context(context);
        self
    }

    pub fn with_tls_builder(mut self, build: TlsBuilder) -> Self {
        self.tls = TlsSource::Builder(build);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Interpret a parsed config file.
    ///
    /// The proxy type is resolved first so an unknown type is reported as
    /// such, before any other check and before any network activity.
    pub fn from_config(config: &ClientConfig) -> std::result::Result<Self, ConfigError> {
        let proxy = ProxyConfig::from_section(&config.proxy)?;
        validate_config(config).map_err(ConfigError::Validation)?;

        let tls = match (config.tls.enabled, &config.tls.ca_file) {
            (false, _) => TlsSource::Disabled,
            (true, Some(path)) => TlsSource::Context(TlsContext::from_ca_file(Path::new(path))?),
            (true, None) => TlsSource::Builder(TlsContext::default_client),
        };

        Ok(Self {
            destination: Destination::new(config.server.host.clone(), config.effective_port()),
            proxy,
            tls,
            timeout: deadline_from_secs(config.server.timeout_secs),
        })
    }
}

/// Drives one connection attempt: `connect`, then `wait_greeting`.
///
/// ```text
/// Idle ──connect──► Dialing ──wait_greeting──► GreetingWait ──► Ready | Failed
/// ```
pub struct Establisher<E: ProtocolEngine = GreetingEngine> {
    id: AttemptId,
    config: EstablisherConfig,
    state: Arc<WaitState>,
    cancel: CancellationToken,
    phase: AttemptPhase,
    dial: Option<JoinHandle<std::result::Result<DialOutcome, DialError>>>,
    engine: Option<E>,
}

impl<E: ProtocolEngine> Establisher<E> {
    pub fn new(config: EstablisherConfig) -> Self {
        Self {
            id: AttemptId::new(),
            config,
            state: Arc::new(WaitState::new()),
            cancel: CancellationToken::new(),
            phase: AttemptPhase::Idle,
            dial: None,
            engine: None,
        }
    }

    /// Build from a config file section. Fails fast on configuration errors.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(Self::new(EstablisherConfig::from_config(config)?))
    }

    /// Cancel the greeting wait when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn id(&self) -> AttemptId {
        self.id
    }

    pub fn phase(&self) -> AttemptPhase {
        self.phase
    }

    pub fn config(&self) -> &EstablisherConfig {
        &self.config
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut E> {
        self.engine.as_mut()
    }

    /// Take the ready engine; `None` unless the attempt reached `Ready`.
    pub fn into_engine(mut self) -> Option<E> {
        self.engine.take()
    }

    fn advance(&mut self, next: AttemptPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "invalid transition {} -> {}",
            self.phase,
            next
        );
        tracing::trace!(attempt = %self.id, from = %self.phase, to = %next, "Attempt phase");
        self.phase = next;
    }

    /// Start dialing in the background and return immediately.
    pub fn connect(&mut self) -> Result<()> {
        if self.phase != AttemptPhase::Idle {
            return Err(Error::InvalidState("connect may only be called once per attempt"));
        }

        let tls = match self.config.tls.resolve() {
            Ok(tls) => tls,
            Err(e) => {
                self.advance(AttemptPhase::Failed);
                return Err(e.into());
            }
        };

        let plan = plan_dial(&self.config.destination, &self.config.proxy, tls);
        tracing::info!(
            attempt = %self.id,
            destination = %self.config.destination,
            path = plan.path(),
            tls = self.config.tls.is_enabled(),
            "Connecting"
        );

        self.dial = Some(spawn_dial(self.id, plan, Arc::clone(&self.state)));
        self.advance(AttemptPhase::Dialing);
        Ok(())
    }

    /// Wait until the server greeting arrives.
    ///
    /// The deadline covers whatever part of the dial is still running plus the
    /// greeting itself. A dial failure during the wait is returned as
    /// [`Error::Dial`] as soon as it happens.
    pub async fn wait_greeting(&mut self, timeout: Option<Duration>) -> Result<()> {
        match self.phase {
            AttemptPhase::Dialing => {}
            AttemptPhase::Ready => return Ok(()),
            AttemptPhase::Idle => return Err(Error::InvalidState("connect has not been called")),
            AttemptPhase::GreetingWait => return Err(Error::InvalidState("greeting wait already running")),
            AttemptPhase::Failed => return Err(Error::InvalidState("attempt already finished")),
        }
        self.advance(AttemptPhase::GreetingWait);

        let Some(dial) = self.dial.as_mut() else {
            self.phase = AttemptPhase::Failed;
            return Err(Error::InvalidState("no dial in progress"));
        };
        let pending = PendingWait {
            id: self.id,
            phase: &mut self.phase,
            dial: dial.abort_handle(),
            armed: true,
        };

        let op = Operation::inline(async move {
            let outcome = dial.await.map_err(|e| {
                if e.is_cancelled() {
                    Error::Cancelled
                } else {
                    Error::TaskPanicked
                }
            })??;

            let transport = match outcome {
                DialOutcome::Established(transport) => transport,
                // The failure is on its way through the wait record.
                DialOutcome::Reported => return std::future::pending().await,
            };

            let mut engine = E::from_transport(transport);
            engine.wait(&SessionState::GREETED).await?;
            Ok(engine)
        });

        let result = wait_for_with(op, timeout, &self.state, &self.cancel).await;
        pending.disarm();

        match result {
            Ok(engine) => {
                self.dial = None;
                tracing::info!(attempt = %self.id, state = %engine.state(), "Session ready");
                self.engine = Some(engine);
                self.advance(AttemptPhase::Ready);
                Ok(())
            }
            Err(e) => {
                self.settle_dial().await;
                tracing::warn!(attempt = %self.id, error = %e, "Connection attempt failed");
                self.advance(AttemptPhase::Failed);
                Err(e)
            }
        }
    }

    /// `connect` followed by `wait_greeting` with the configured timeout.
    pub async fn establish(&mut self) -> Result<()> {
        self.connect()?;
        let timeout = self.config.timeout;
        self.wait_greeting(timeout).await
    }

    /// Abort a dial that is still running and wait for it to stop.
    async fn settle_dial(&mut self) {
        if let Some(dial) = self.dial.take() {
            if !dial.is_finished() {
                dial.abort();
                let _ = dial.await;
            }
        }
    }
}

/// Fails the attempt and aborts the dial when a greeting wait is dropped
/// before it returns.
struct PendingWait<'a> {
    id: AttemptId,
    phase: &'a mut AttemptPhase,
    dial: AbortHandle,
    armed: bool,
}

impl PendingWait<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingWait<'_> {
    fn drop(&mut self) {
        if !self.armed || self.phase.is_terminal() {
            return;
        }
        self.dial.abort();
        *self.phase = AttemptPhase::Failed;
        tracing::debug!(attempt = %self.id, "Greeting wait dropped, dial aborted");
    }
}

impl<E: ProtocolEngine> Drop for Establisher<E> {
    fn drop(&mut self) {
        if let Some(dial) = &self.dial {
            dial.abort();
        }
    }
}
