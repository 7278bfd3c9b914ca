//! Stop, shutdown, and kill composed from signal delivery, power-state
//! waits, and hard power-off.
//!
//! A graceful shutdown walks the stop-signal sequence as a small state
//! machine:
//!
//! ```text
//! Dispatch(i) --delivered--> Wait(i) --powered off--> Done
//!      |                        |
//!      | dispatch failed        +--timed out--> Dispatch(i + 1) | Exhausted
//!      v                        |
//!    Abort <----other failure---+
//! ```

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use vesta_common::constants::KILL_TIMEOUT_SECS;
use vesta_common::types::PowerState;

use crate::controller::{require_handle, Controller};
use crate::error::{LifecycleError, Result};
use crate::executor::Session;
use crate::fault::{classify, Disposition};
use crate::guest::Signal;
use crate::snapshot::Snapshot;
use crate::waiter::effective_wait;

/// Position in the stop-signal sequence.
#[derive(Debug)]
pub enum Step {
    /// Deliver the signal at this index.
    Dispatch(usize),
    /// Wait for power-off after delivering the signal at this index.
    Wait(usize),
    /// The VM powered off.
    Done,
    /// Stop escalating and return this error.
    Abort(LifecycleError),
    /// Every signal timed out.
    Exhausted,
}

/// Result of carrying out one step.
#[derive(Debug)]
pub enum Event {
    /// The signal program was started in the guest.
    Dispatched,
    /// The signal program could not be started.
    DispatchFailed(LifecycleError),
    /// The VM reached powered-off.
    PoweredOff,
    /// The power-off wait ended without success.
    WaitFailed(LifecycleError),
}

/// Moves the sequence forward from the step at index `at` of `total`
/// signals.
#[must_use]
pub fn transition(at: usize, total: usize, event: Event) -> Step {
    match event {
        Event::Dispatched => Step::Wait(at),
        Event::DispatchFailed(err) => Step::Abort(err),
        Event::PoweredOff => Step::Done,
        Event::WaitFailed(err) => match classify(&err) {
            Disposition::Retry if at + 1 < total => Step::Dispatch(at + 1),
            Disposition::Retry => Step::Exhausted,
            Disposition::Absorb | Disposition::Fatal => Step::Abort(err),
        },
    }
}

/// Window `kill` waits for power-off before forcing it.
pub const KILL_WAIT: Duration = Duration::from_secs(KILL_TIMEOUT_SECS);

/// Signals tried by a graceful shutdown, in order: the session's configured
/// stop signal (or `TERM`), then `KILL`.
#[must_use]
pub fn stop_signals(session: Option<&Session>) -> Vec<Signal> {
    let configured = session
        .and_then(|s| s.stop_signal.as_deref())
        .filter(|s| !s.trim().is_empty())
        .map_or_else(Signal::term, Signal::new);
    vec![configured, Signal::kill()]
}

impl Controller {
    /// Stops the container gracefully and falls back to a hard power-off if
    /// that fails for any reason.
    ///
    /// # Errors
    ///
    /// Returns `NotYetExist` when the snapshot has no VM, otherwise the
    /// power-off failure if the fallback was needed and failed.
    pub async fn stop(
        &self,
        snapshot: &Snapshot,
        wait: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _handle = require_handle(snapshot)?;

        match self.shutdown(snapshot, wait, cancel).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(id = %snapshot.id(), reason = %err, "stopping via hard power off");
                self.poweroff(snapshot, cancel).await
            }
        }
    }

    /// Delivers the stop signals in order, waiting up to `wait` (10 s when
    /// absent or zero) for power-off after each one.
    ///
    /// # Errors
    ///
    /// Returns `NotYetExist` when the snapshot has no VM, `SignalDispatch`
    /// when a signal cannot be delivered, a non-timeout wait failure as is,
    /// or `ShutdownExhausted` when every signal timed out.
    pub async fn shutdown(
        &self,
        snapshot: &Snapshot,
        wait: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _handle = require_handle(snapshot)?;
        let id = snapshot.id();
        let wait = effective_wait(wait, self.config().stop_timeout());
        let signals = stop_signals(snapshot.primary_session());

        let mut step = Step::Dispatch(0);
        loop {
            step = match step {
                Step::Dispatch(at) => {
                    let signal = &signals[at];
                    let event = match self.send_signal(snapshot, signal, cancel).await {
                        Ok(()) => Event::Dispatched,
                        Err(err) => Event::DispatchFailed(LifecycleError::SignalDispatch {
                            id: id.clone(),
                            signal: signal.clone(),
                            source: Box::new(err),
                        }),
                    };
                    transition(at, signals.len(), event)
                }
                Step::Wait(at) => {
                    tracing::info!(id = %id, ?wait, "waiting for power off");
                    let event = match self
                        .wait_for_power_state(snapshot, wait, PowerState::PoweredOff, cancel)
                        .await
                    {
                        Ok(()) => Event::PoweredOff,
                        Err(err) => {
                            if err.timed_out() {
                                tracing::warn!(
                                    id = %id,
                                    signal = %signals[at],
                                    ?wait,
                                    "timeout waiting for power off via SIG{}",
                                    signals[at]
                                );
                            }
                            Event::WaitFailed(err.into())
                        }
                    };
                    transition(at, signals.len(), event)
                }
                Step::Done => return Ok(()),
                Step::Abort(err) => return Err(err),
                Step::Exhausted => {
                    return Err(LifecycleError::ShutdownExhausted {
                        id: id.clone(),
                        signals,
                    });
                }
            };
        }
    }

    /// Sends `KILL` and waits [`KILL_WAIT`] for power-off; if the signal
    /// cannot be delivered or the VM stays on, forces a hard power-off.
    ///
    /// # Errors
    ///
    /// Returns `NotYetExist` when the snapshot has no VM, otherwise the
    /// power-off failure if the fallback was needed and failed.
    pub async fn kill(&self, snapshot: &Snapshot, cancel: &CancellationToken) -> Result<()> {
        let _handle = require_handle(snapshot)?;
        let id = snapshot.id();
        let wait = KILL_WAIT;
        let signal = Signal::kill();

        match self.send_signal(snapshot, &signal, cancel).await {
            Ok(()) => {
                tracing::info!(id = %id, ?wait, "waiting for power off");
                match self
                    .wait_for_power_state(snapshot, wait, PowerState::PoweredOff, cancel)
                    .await
                {
                    Ok(()) => return Ok(()),
                    Err(err) if err.timed_out() => {
                        tracing::warn!(id = %id, ?wait, "timeout waiting for power off via SIG{signal}");
                    }
                    Err(err) => {
                        tracing::warn!(id = %id, error = %err, "kill attempt failed");
                    }
                }
            }
            Err(err) => {
                tracing::warn!(id = %id, error = %err, "kill attempt failed");
            }
        }

        tracing::warn!(id = %id, "killing via hard power off");
        self.poweroff(snapshot, cancel).await
    }
}
