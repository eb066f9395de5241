//! Timeout enforcement.
//!
//! # Responsibilities
//! - Await any operation with an optional deadline
//! - Cancel the operation cleanly on timeout or external cancellation, and
//!   wait for the cancellation to settle before reporting
//! - Surface a dial failure captured on the side channel instead of a generic
//!   timeout
//!
//! # Design Decisions
//! - Uses Tokio's timer and task facilities
//! - Timeout errors are distinct from other errors
//! - Exactly one deadline timer per wait; teardown is idempotent
//!
//! # Wait Record
//! ```text
//! WaitState { epoch, last_error, waiter, deadline }
//!
//!   wait_for_with ── reset ─ arm(waiter, deadline) ─┬─ op done ─────► disarm, result
//!                                                   ├─ cancel token ► disarm, cancel op, Cancelled
//!                                                   └─ waiter fired ► disarm, cancel op,
//!                                                        last_error? Dial(err) : Timeout
//!   deadline timer ─ sleep ─ fire_deadline(epoch) ───► waiter
//!   dial task ───── report_failure(err) ─────────────► last_error, deadline.abort(), waiter
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{ready, Context, Poll};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::error::{DialError, Error, Result};
use crate::observability::metrics;

/// Convert configured seconds into a deadline.
///
/// `None` means no timeout. Zero, negative and NaN values mean the deadline
/// has already passed.
pub fn deadline_from_secs(secs: Option<f64>) -> Option<Duration> {
    secs.map(|s| {
        if s > 0.0 {
            Duration::try_from_secs_f64(s).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    })
}

/// A unit of asynchronous work handed to [`wait_for`].
///
/// Either a future that has not been scheduled yet (polled in place by the
/// waiter, cancelled by dropping it) or a task already running on the runtime
/// (cancelled by aborting it and awaiting the handle). Dropping an
/// `Operation` that still owns a task aborts that task.
pub struct Operation<'a, T> {
    kind: Kind<'a, T>,
}

enum Kind<'a, T> {
    Inline(BoxFuture<'a, Result<T>>),
    Spawned(JoinHandle<Result<T>>),
    Settled,
}

impl<'a, T> Operation<'a, T> {
    /// Wrap a future that the waiter drives itself.
    pub fn inline<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'a,
    {
        Self {
            kind: Kind::Inline(Box::pin(future)),
        }
    }

    /// Schedule `future` on the runtime right away.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        Self::from_handle(tokio::spawn(future))
    }

    /// Adopt a task that is already running.
    pub fn from_handle(handle: JoinHandle<Result<T>>) -> Self {
        Self {
            kind: Kind::Spawned(handle),
        }
    }

    /// Whether a result is available without waiting.
    ///
    /// Inline futures only report completion by being polled.
    pub fn is_finished(&self) -> bool {
        match &self.kind {
            Kind::Inline(_) => false,
            Kind::Spawned(handle) => handle.is_finished(),
            Kind::Settled => true,
        }
    }

    /// Force cancellation and wait until it has settled.
    ///
    /// Returns `Some` when the operation produced a result anyway, because it
    /// completed before the abort took effect or because it panicked.
    pub async fn cancel(&mut self) -> Option<Result<T>> {
        match std::mem::replace(&mut self.kind, Kind::Settled) {
            Kind::Inline(future) => {
                drop(future);
                None
            }
            Kind::Spawned(handle) => {
                handle.abort();
                match handle.await {
                    Ok(result) => Some(result),
                    Err(e) if e.is_cancelled() => None,
                    Err(e) => Some(Err(join_error(e))),
                }
            }
            Kind::Settled => None,
        }
    }
}

impl<T> From<JoinHandle<Result<T>>> for Operation<'_, T> {
    fn from(handle: JoinHandle<Result<T>>) -> Self {
        Self::from_handle(handle)
    }
}

impl<T> Future for Operation<'_, T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let output = match &mut this.kind {
            Kind::Inline(future) => ready!(future.as_mut().poll(cx)),
            Kind::Spawned(handle) => ready!(Pin::new(handle).poll(cx)).unwrap_or_else(|e| Err(join_error(e))),
            Kind::Settled => Err(Error::Cancelled),
        };
        this.kind = Kind::Settled;
        Poll::Ready(output)
    }
}

impl<T> Drop for Operation<'_, T> {
    fn drop(&mut self) {
        if let Kind::Spawned(handle) = &self.kind {
            handle.abort();
        }
    }
}

fn join_error(e: JoinError) -> Error {
    if e.is_cancelled() {
        Error::Cancelled
    } else {
        Error::TaskPanicked
    }
}

/// Shared record between a waiter, its deadline timer and a background dial.
///
/// Every field is reset when a new wait begins. The epoch keeps a timer from
/// an earlier wait from releasing a later waiter.
#[derive(Debug, Default)]
pub struct WaitState {
    slots: Mutex<Slots>,
}

#[derive(Debug, Default)]
struct Slots {
    epoch: u64,
    last_error: Option<DialError>,
    waiter: Option<oneshot::Sender<()>>,
    deadline: Option<AbortHandle>,
}

impl WaitState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear every slot and start a new epoch.
    pub fn reset(&self) -> u64 {
        let mut slots = self.lock();
        if let Some(deadline) = slots.deadline.take() {
            deadline.abort();
        }
        slots.waiter = None;
        slots.last_error = None;
        slots.epoch += 1;
        slots.epoch
    }

    /// Register the waiter and the deadline timer guarding it.
    pub fn arm(&self, waiter: oneshot::Sender<()>, deadline: AbortHandle) {
        let mut slots = self.lock();
        slots.waiter = Some(waiter);
        slots.deadline = Some(deadline);
    }

    /// Whether a waiter is currently registered.
    pub fn has_waiter(&self) -> bool {
        self.lock().waiter.is_some()
    }

    /// Deregister the deadline timer and the waiter. Safe to call repeatedly.
    pub fn disarm(&self) {
        let mut slots = self.lock();
        if let Some(deadline) = slots.deadline.take() {
            deadline.abort();
        }
        slots.waiter = None;
    }

    /// Called by the deadline timer. Returns whether a waiter was released.
    pub fn fire_deadline(&self, epoch: u64) -> bool {
        let mut slots = self.lock();
        if slots.epoch != epoch {
            return false;
        }
        slots.deadline = None;
        match slots.waiter.take() {
            Some(waiter) => waiter.send(()).is_ok(),
            None => false,
        }
    }

    /// Record a dial failure and wake the registered waiter, if any.
    ///
    /// Order matters: the error is stored before the timer is cancelled and
    /// the timer is cancelled before the waiter is released, so a woken
    /// waiter always finds the error. Returns `false` when nobody is waiting,
    /// in which case the caller keeps ownership of the failure.
    pub fn report_failure(&self, error: DialError) -> bool {
        let mut slots = self.lock();
        slots.last_error = Some(error);
        let Some(waiter) = slots.waiter.take() else {
            return false;
        };
        if let Some(deadline) = slots.deadline.take() {
            deadline.abort();
        }
        waiter.send(()).is_ok()
    }

    /// Take the recorded dial failure.
    pub fn take_error(&self) -> Option<DialError> {
        self.lock().last_error.take()
    }
}

/// Disarms on every exit path, including drop of the wait future.
struct Armed<'a>(&'a WaitState);

impl Drop for Armed<'_> {
    fn drop(&mut self) {
        self.0.disarm();
    }
}

/// Await `op`, giving up after `timeout`.
///
/// Uses a private wait record and no external cancellation.
pub async fn wait_for<T>(op: Operation<'_, T>, timeout: Option<Duration>) -> Result<T> {
    let state = Arc::new(WaitState::new());
    wait_for_with(op, timeout, &state, &CancellationToken::new()).await
}

/// Await `op` with a deadline, a shared wait record and a cancellation token.
///
/// - `None`: pass the operation's result through unchanged.
/// - zero: return a result that is already available, otherwise cancel the
///   operation and report [`Error::Timeout`].
/// - positive: race the operation against the deadline and `cancel`. When the
///   waiter is released early by [`WaitState::report_failure`], the captured
///   [`DialError`] is returned instead of a timeout.
///
/// In every branch a cancelled operation has fully settled before this
/// returns, and a result produced despite cancellation wins.
pub async fn wait_for_with<T>(
    op: Operation<'_, T>,
    timeout: Option<Duration>,
    state: &Arc<WaitState>,
    cancel: &CancellationToken,
) -> Result<T> {
    let result = wait_inner(op, timeout, state, cancel).await;

    let outcome = match &result {
        Ok(_) => "ok",
        Err(Error::Timeout(_)) => "timeout",
        Err(Error::Cancelled) => "cancelled",
        Err(Error::Dial(_)) => "dial_error",
        Err(_) => "error",
    };
    metrics::record_wait(outcome);
    tracing::trace!(?timeout, outcome, "Wait finished");

    result
}

async fn wait_inner<T>(
    mut op: Operation<'_, T>,
    timeout: Option<Duration>,
    state: &Arc<WaitState>,
    cancel: &CancellationToken,
) -> Result<T> {
    let epoch = state.reset();

    let Some(timeout) = timeout else {
        return tokio::select! {
            biased;
            result = &mut op => result,
            _ = cancel.cancelled() => settle_cancelled(&mut op).await,
        };
    };

    if timeout.is_zero() {
        if let Poll::Ready(result) = futures_util::poll!(&mut op) {
            return result;
        }
        return match op.cancel().await {
            Some(result) => result,
            None => Err(Error::Timeout(timeout)),
        };
    }

    let (waiter, released) = oneshot::channel();
    let timer = tokio::spawn(fire_after(Arc::clone(state), epoch, timeout));
    state.arm(waiter, timer.abort_handle());
    let _armed = Armed(state);

    tokio::select! {
        biased;
        result = &mut op => {
            state.disarm();
            result
        }
        _ = cancel.cancelled() => {
            state.disarm();
            settle_cancelled(&mut op).await
        }
        _ = released => {
            state.disarm();
            match op.cancel().await {
                Some(result) => result,
                None => match state.take_error() {
                    Some(e) => Err(Error::Dial(e)),
                    None => Err(Error::Timeout(timeout)),
                },
            }
        }
    }
}

async fn settle_cancelled<T>(op: &mut Operation<'_, T>) -> Result<T> {
    if op.is_finished() {
        return op.await;
    }
    let _ = op.cancel().await;
    Err(Error::Cancelled)
}

async fn fire_after(state: Arc<WaitState>, epoch: u64, after: Duration) {
    tokio::time::sleep(after).await;
    if state.fire_deadline(epoch) {
        tracing::debug!(timeout = ?after, "Deadline elapsed");
    }
}
