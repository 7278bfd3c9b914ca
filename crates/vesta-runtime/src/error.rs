//! Error types for lifecycle operations.

use std::time::Duration;

use thiserror::Error;
use vesta_common::types::{ContainerId, PowerState};

use crate::codec::CodecError;
use crate::guest::Signal;
use crate::infra::{Fault, InfraError};

/// Error returned by lifecycle and refresh operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The snapshot has no live VM behind it yet.
    #[error("{id} is not completely created")]
    NotYetExist {
        /// Container the operation was attempted on.
        id: ContainerId,
    },

    /// The infrastructure rejected a query or a task failed.
    #[error(transparent)]
    Infrastructure(#[from] InfraError),

    /// The metadata blob could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The VM did not reach the target power state in time.
    #[error("timed out after {after:?} waiting for power state {target}")]
    PowerStateTimeout {
        /// Target state that was not reached.
        target: PowerState,
        /// Length of the wait.
        after: Duration,
    },

    /// The guest's launch status could not be read.
    #[error("unable to wait for process launch status: {reason}")]
    LaunchStatus {
        /// Why the wait ended without a value.
        reason: String,
    },

    /// The guest reported that the session failed to launch.
    #[error("{0}")]
    GuestReported(String),

    /// A stop signal could not be delivered to the guest.
    #[error("sending kill -{signal} {id}: {source}")]
    SignalDispatch {
        /// Target container.
        id: ContainerId,
        /// Signal being sent.
        signal: Signal,
        /// Why dispatch failed.
        #[source]
        source: Box<LifecycleError>,
    },

    /// Every signal of the stop sequence timed out.
    #[error("failed to shutdown {id} via kill signals {}", format_signals(signals))]
    ShutdownExhausted {
        /// Target container.
        id: ContainerId,
        /// Signals tried, in order.
        signals: Vec<Signal>,
    },
}

impl LifecycleError {
    /// Returns the structured task fault behind this error, if any.
    #[must_use]
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Infrastructure(InfraError::Fault(fault)) => Some(fault),
            _ => None,
        }
    }
}

fn format_signals(signals: &[Signal]) -> String {
    let names: Vec<&str> = signals.iter().map(Signal::as_str).collect();
    format!("[{}]", names.join(" "))
}

/// Outcome of a bounded power-state wait that did not succeed.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The deadline elapsed before the target state was observed.
    #[error("timed out after {after:?} waiting for power state {target}")]
    TimedOut {
        /// Target state.
        target: PowerState,
        /// Length of the wait.
        after: Duration,
    },

    /// The wait ended for a reason other than its deadline.
    #[error(transparent)]
    Failed(#[from] LifecycleError),
}

impl WaitError {
    /// Whether the deadline is what ended the wait.
    #[must_use]
    pub const fn timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

impl From<WaitError> for LifecycleError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::TimedOut { target, after } => Self::PowerStateTimeout { target, after },
            WaitError::Failed(inner) => inner,
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, LifecycleError>;
