//! Point-in-time view of a container's VM.
//!
//! A [`Snapshot`] bundles the instance handle, the hypervisor's config and
//! runtime info, and the executor configuration decoded from that same
//! config. All four always come from one refresh. Snapshots are never edited:
//! [`Controller::refresh`] returns a new one and the caller replaces the one it
//! holds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use vesta_common::types::{ContainerId, ContainerState, PowerState};

use crate::codec::MetadataCodec;
use crate::controller::{guarded, require_handle, Controller};
use crate::error::{LifecycleError, Result};
use crate::executor::{ExecutorConfig, Session};
use crate::infra::{ConfigInfo, InstanceHandle, RuntimeInfo};

/// Immutable snapshot of one container's infrastructure state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    handle: Option<Arc<InstanceHandle>>,
    config: Option<Arc<ConfigInfo>>,
    runtime: Option<Arc<RuntimeInfo>>,
    exec_config: Arc<ExecutorConfig>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Snapshot for a container whose VM does not exist yet. Every operation
    /// needing a live VM fails with `NotYetExist`.
    #[must_use]
    pub fn unmaterialized(exec_config: ExecutorConfig) -> Self {
        Self {
            handle: None,
            config: None,
            runtime: None,
            exec_config: Arc::new(exec_config),
            refreshed_at: None,
        }
    }

    /// Builds a snapshot from properties already at hand, decoding the
    /// executor configuration from `config`. A blob without an id takes the
    /// VM's UUID as the container id.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the metadata blob is malformed.
    pub fn from_parts(
        handle: Arc<InstanceHandle>,
        config: ConfigInfo,
        runtime: RuntimeInfo,
        codec: &dyn MetadataCodec,
    ) -> Result<Self> {
        let mut exec_config = codec.decode(&config.extra_config)?;
        if exec_config.id.as_str().is_empty() {
            exec_config.id = ContainerId::new(config.uuid.as_str());
        }
        Ok(Self::assemble(handle, config, runtime, exec_config))
    }

    fn assemble(
        handle: Arc<InstanceHandle>,
        config: ConfigInfo,
        runtime: RuntimeInfo,
        exec_config: ExecutorConfig,
    ) -> Self {
        Self {
            handle: Some(handle),
            config: Some(Arc::new(config)),
            runtime: Some(Arc::new(runtime)),
            exec_config: Arc::new(exec_config),
            refreshed_at: Some(Utc::now()),
        }
    }

    /// Container identifier.
    #[must_use]
    pub fn id(&self) -> &ContainerId {
        &self.exec_config.id
    }

    /// Handle of the backing VM, if it exists.
    #[must_use]
    pub fn handle(&self) -> Option<&Arc<InstanceHandle>> {
        self.handle.as_ref()
    }

    /// Hypervisor configuration as of the last refresh.
    #[must_use]
    pub fn config(&self) -> Option<&ConfigInfo> {
        self.config.as_deref()
    }

    /// Hypervisor runtime info as of the last refresh.
    #[must_use]
    pub fn runtime(&self) -> Option<&RuntimeInfo> {
        self.runtime.as_deref()
    }

    /// Decoded executor configuration.
    #[must_use]
    pub fn exec_config(&self) -> &ExecutorConfig {
        &self.exec_config
    }

    /// When the infrastructure was last queried for this snapshot.
    #[must_use]
    pub const fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// Last observed power state.
    #[must_use]
    pub fn power_state(&self) -> Option<PowerState> {
        self.runtime.as_ref().map(|r| r.power_state)
    }

    /// Container state derived from the last observed power state.
    #[must_use]
    pub fn state(&self) -> ContainerState {
        self.power_state()
            .map_or(ContainerState::Created, ContainerState::from)
    }

    /// The session whose id matches the container id.
    #[must_use]
    pub fn primary_session(&self) -> Option<&Session> {
        self.exec_config.primary_session()
    }
}

impl Controller {
    /// Fetches current properties for the snapshot's VM and returns a new
    /// snapshot built from them. The input snapshot is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `NotYetExist` without calling the infrastructure when the
    /// snapshot has no VM; infrastructure errors are returned as reported.
    pub async fn refresh(&self, snapshot: &Snapshot, cancel: &CancellationToken) -> Result<Snapshot> {
        let handle = require_handle(snapshot)?;

        let fetched = async {
            let (config, runtime) =
                guarded(cancel, handle.infra().properties(handle.reference())).await?;
            let exec_config = self.codec().decode(&config.extra_config)?;
            Ok::<_, LifecycleError>((config, runtime, exec_config))
        };
        let (config, runtime, mut exec_config) = fetched
            .await
            .inspect_err(|e| tracing::error!(id = %snapshot.id(), error = %e, "unable to update container"))?;

        if exec_config.id.as_str().is_empty() {
            exec_config.id = snapshot.id().clone();
        }

        tracing::debug!(
            id = %exec_config.id,
            power_state = %runtime.power_state,
            "container state refreshed"
        );
        Ok(Snapshot::assemble(Arc::clone(handle), config, runtime, exec_config))
    }
}
