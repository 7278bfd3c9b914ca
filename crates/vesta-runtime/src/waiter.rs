//! Bounded waits for a VM to reach a power state.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use vesta_common::types::PowerState;

use crate::controller::{guarded, require_handle, Controller};
use crate::error::WaitError;
use crate::snapshot::Snapshot;

/// Picks the wait window: a positive caller value wins, otherwise `default`.
#[must_use]
pub fn effective_wait(requested: Option<Duration>, default: Duration) -> Duration {
    requested.filter(|d| !d.is_zero()).unwrap_or(default)
}

impl Controller {
    /// Blocks until the snapshot's VM reports `target`, at most `max`.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::TimedOut`] when `max` elapses first, so callers
    /// can tell a VM that is still running from a failed wait. Any other
    /// failure, including cancellation and `NotYetExist`, is
    /// [`WaitError::Failed`].
    pub async fn wait_for_power_state(
        &self,
        snapshot: &Snapshot,
        max: Duration,
        target: PowerState,
        cancel: &CancellationToken,
    ) -> Result<(), WaitError> {
        let handle = require_handle(snapshot)?;

        let wait = guarded(
            cancel,
            handle.infra().wait_for_power_state(handle.reference(), target),
        );
        match tokio::time::timeout(max, wait).await {
            Ok(result) => result.map_err(WaitError::from),
            Err(_elapsed) => Err(WaitError::TimedOut { target, after: max }),
        }
    }
}
