//! Power-on and hard power-off of the backing VM.

use tokio_util::sync::CancellationToken;
use vesta_common::constants::LAUNCH_SUCCESS;

use crate::controller::{guarded, require_handle, run_task, Controller};
use crate::error::{LifecycleError, Result};
use crate::fault::{classify, Disposition};
use crate::snapshot::Snapshot;

impl Controller {
    /// Powers the VM on and waits for the guest to report that the primary
    /// session launched.
    ///
    /// # Errors
    ///
    /// Returns `NotYetExist` when the snapshot has no VM, the power-on task's
    /// failure as reported, `LaunchStatus` when the launch status cannot be
    /// read in time, or `GuestReported` carrying the guest's own failure
    /// detail.
    pub async fn start(&self, snapshot: &Snapshot, cancel: &CancellationToken) -> Result<()> {
        let handle = require_handle(snapshot)?;
        let id = snapshot.id();

        let key = self.codec().calculate_key(
            snapshot.exec_config(),
            &format!("Sessions.{id}.Started"),
            "",
        )?;

        tracing::info!(id = %id, "powering on");
        run_task(handle, cancel, handle.infra().power_on(handle.reference())).await?;

        let limit = self.config().launch_status_timeout();
        tracing::debug!(id = %id, key = %key, ?limit, "waiting for launch status");
        let wait = guarded(
            cancel,
            handle.infra().wait_for_metadata_key(handle.reference(), &key),
        );
        let detail = match tokio::time::timeout(limit, wait).await {
            Ok(Ok(detail)) => detail,
            Ok(Err(LifecycleError::Cancelled)) => return Err(LifecycleError::Cancelled),
            Ok(Err(err)) => {
                return Err(LifecycleError::LaunchStatus {
                    reason: err.to_string(),
                });
            }
            Err(_elapsed) => {
                return Err(LifecycleError::LaunchStatus {
                    reason: format!("no value for {key} after {limit:?}"),
                });
            }
        };

        if detail != LAUNCH_SUCCESS {
            tracing::warn!(id = %id, detail = %detail, "guest reported launch failure");
            return Err(LifecycleError::GuestReported(detail));
        }

        tracing::info!(id = %id, "container started");
        Ok(())
    }

    /// Forces the VM off. Succeeds if the VM turns out to be off already or
    /// was shut down by its guest while the request was in flight.
    ///
    /// # Errors
    ///
    /// Returns `NotYetExist` when the snapshot has no VM, or the power-off
    /// failure when it does not prove the VM is off.
    pub async fn poweroff(&self, snapshot: &Snapshot, cancel: &CancellationToken) -> Result<()> {
        let handle = require_handle(snapshot)?;
        let id = snapshot.id();

        let Err(err) = run_task(handle, cancel, handle.infra().power_off(handle.reference())).await
        else {
            tracing::info!(id = %id, "powered off");
            return Ok(());
        };

        match classify(&err) {
            Disposition::Absorb => {
                tracing::warn!(id = %id, reason = %err, "power off task skipped, vm already off");
                Ok(())
            }
            Disposition::Retry | Disposition::Fatal => {
                tracing::warn!(id = %id, error = %err, "hard power off failed");
                Err(err)
            }
        }
    }
}
