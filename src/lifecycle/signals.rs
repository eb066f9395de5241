//! OS signal handling.
//!
//! # Responsibilities
//! - Translate Ctrl-C into cancellation of the current attempt
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A second Ctrl-C is left to the default handler once the task has exited

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancel `token` on the first Ctrl-C.
///
/// The returned task also finishes when `token` is cancelled some other way,
/// so it never outlives the attempt it guards.
pub fn cancel_on_interrupt(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    tracing::info!("Interrupt received, cancelling");
                    token.cancel();
                }
                Err(e) => tracing::warn!(error = %e, "Unable to listen for interrupt"),
            },
            _ = token.cancelled() => {}
        }
    })
}
