//! Lifecycle controller shared by every container operation.
//!
//! [`Controller`] carries configuration and the metadata codec only. It
//! holds no per-container state: every operation takes the caller's
//! [`Snapshot`] by reference and a [`CancellationToken`] that aborts any
//! in-flight infrastructure call.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use vesta_common::config::LifecycleConfig;
use vesta_common::error::VestaError;

use crate::codec::{GuestInfoCodec, MetadataCodec};
use crate::error::{LifecycleError, Result};
use crate::infra::{InfraError, InstanceHandle, TaskRef};
use crate::snapshot::Snapshot;

/// Runs start, stop, kill, shutdown, and refresh against VM-backed
/// containers.
#[derive(Clone)]
pub struct Controller {
    config: LifecycleConfig,
    codec: Arc<dyn MetadataCodec>,
}

impl Controller {
    /// Creates a controller using the `guestinfo` codec with the configured
    /// prefix.
    ///
    /// # Errors
    ///
    /// Returns [`VestaError::Config`] if `config` fails validation.
    pub fn new(config: LifecycleConfig) -> std::result::Result<Self, VestaError> {
        let codec = Arc::new(GuestInfoCodec::new(config.metadata_prefix.clone()));
        Self::with_codec(config, codec)
    }

    /// Creates a controller with a custom metadata codec.
    ///
    /// # Errors
    ///
    /// Returns [`VestaError::Config`] if `config` fails validation.
    pub fn with_codec(
        config: LifecycleConfig,
        codec: Arc<dyn MetadataCodec>,
    ) -> std::result::Result<Self, VestaError> {
        config.validate()?;
        Ok(Self { config, codec })
    }

    /// Lifecycle tunables in effect.
    #[must_use]
    pub const fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Metadata codec in effect.
    #[must_use]
    pub fn codec(&self) -> &dyn MetadataCodec {
        self.codec.as_ref()
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self {
            config: LifecycleConfig::default(),
            codec: Arc::new(GuestInfoCodec::default()),
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Returns the live handle or `NotYetExist` for the snapshot's container.
pub(crate) fn require_handle(snapshot: &Snapshot) -> Result<&Arc<InstanceHandle>> {
    snapshot.handle().ok_or_else(|| LifecycleError::NotYetExist {
        id: snapshot.id().clone(),
    })
}

/// Awaits a submitted task's completion.
pub(crate) async fn run_task<Fut>(
    handle: &InstanceHandle,
    cancel: &CancellationToken,
    submit: Fut,
) -> Result<()>
where
    Fut: Future<Output = std::result::Result<TaskRef, InfraError>>,
{
    let task = guarded(cancel, submit).await?;
    tracing::debug!(task = %task, "waiting for task");
    guarded(cancel, handle.infra().wait_for_task(&task)).await
}

/// Awaits an infrastructure call unless the caller cancels first.
///
/// On cancellation the call's future is dropped.
pub(crate) async fn guarded<T, Fut>(cancel: &CancellationToken, call: Fut) -> Result<T>
where
    Fut: Future<Output = std::result::Result<T, InfraError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(LifecycleError::Cancelled),
        result = call => result.map_err(LifecycleError::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_stop_window_is_rejected() {
        let config = LifecycleConfig {
            stop_timeout_secs: 0,
            ..LifecycleConfig::default()
        };
        let err = Controller::new(config).unwrap_err();
        assert!(matches!(err, VestaError::Config { .. }));
        assert!(err.to_string().contains("stop_timeout_secs"));
    }

    #[test]
    fn custom_codec_config_is_validated_too() {
        let config = LifecycleConfig {
            metadata_prefix: String::new(),
            ..LifecycleConfig::default()
        };
        assert!(Controller::with_codec(config, Arc::new(GuestInfoCodec::default())).is_err());
    }

    #[test]
    fn default_controller_uses_default_windows() {
        let controller = Controller::default();
        assert_eq!(controller.config(), &LifecycleConfig::default());
        assert!(Controller::new(LifecycleConfig::default()).is_ok());
    }
}
