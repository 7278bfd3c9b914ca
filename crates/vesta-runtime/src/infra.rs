//! Infrastructure capability consumed by the lifecycle core.
//!
//! The hypervisor client lives outside this crate. It is reached through
//! [`Infrastructure`], which exposes only VM-level primitives: property
//! queries, power tasks, guest program execution, and metadata waits.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vesta_common::types::PowerState;

/// A single key/value entry of the VM's metadata blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValue {
    /// Metadata key.
    pub key: String,
    /// Metadata value.
    pub value: String,
}

impl OptionValue {
    /// Creates a new key/value entry.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Static VM configuration as reported by the hypervisor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigInfo {
    /// Display name of the VM.
    pub name: String,
    /// Hypervisor-assigned UUID.
    pub uuid: String,
    /// Opaque metadata blob carrying the executor configuration.
    pub extra_config: Vec<OptionValue>,
}

/// Dynamic VM state as reported by the hypervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    /// Current power state.
    pub power_state: PowerState,
    /// Time of the last power-on, if the VM has booted.
    pub boot_time: Option<DateTime<Utc>>,
}

/// Reference to an asynchronous infrastructure task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskRef(pub String);

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Credentials the guest agent uses to start a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestAuth {
    /// Guest user name.
    pub username: String,
    /// Guest password, if any.
    pub password: Option<String>,
}

/// Program to start inside the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSpec {
    /// Program path or name resolved by the guest.
    pub program_path: String,
    /// Space-separated argument string.
    pub arguments: String,
}

/// One localized entry of a fault's message list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultMessage {
    /// Message catalog key.
    pub key: String,
    /// Human-readable message.
    pub message: String,
}

/// Structured fault reported by a failed infrastructure task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// The VM was not in a state that permits the requested operation.
    #[error("invalid power state (existing state {existing})")]
    InvalidPowerState {
        /// State the operation expected, if the infrastructure reports it.
        requested: Option<PowerState>,
        /// State the VM was actually in.
        existing: PowerState,
    },

    /// A generic VM configuration fault with a list of catalog messages.
    #[error("generic vm config fault: {}", first_message(messages))]
    GenericVmConfig {
        /// Catalog messages, most specific first.
        messages: Vec<FaultMessage>,
    },

    /// Another task is already running against the VM.
    #[error("task {task} already in progress")]
    TaskInProgress {
        /// The conflicting task.
        task: String,
    },

    /// Any fault shape this crate does not model.
    #[error("{kind}: {message}")]
    Other {
        /// Fault type name.
        kind: String,
        /// Fault description.
        message: String,
    },
}

fn first_message(messages: &[FaultMessage]) -> &str {
    messages.first().map_or("<no message>", |m| m.message.as_str())
}

/// Error surfaced by the infrastructure client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InfraError {
    /// A task completed with a structured fault.
    #[error("task failed: {0}")]
    Fault(#[from] Fault),

    /// The request could not be carried out (transport, session, API).
    #[error("infrastructure request failed: {message}")]
    Request {
        /// Description of the failure.
        message: String,
    },
}

impl InfraError {
    /// Builds a [`InfraError::Request`] from any message.
    #[must_use]
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }
}

/// VM-level primitives of the hypervisor-managed cluster.
///
/// Every method may block on a network round trip. Implementations do not
/// need to handle cancellation: the core drops the returned future when the
/// caller cancels or a deadline fires.
#[async_trait]
pub trait Infrastructure: Send + Sync {
    /// Fetches the `config` and `runtime` properties of a VM.
    async fn properties(&self, reference: &str) -> Result<(ConfigInfo, RuntimeInfo), InfraError>;

    /// Submits a power-on task.
    async fn power_on(&self, reference: &str) -> Result<TaskRef, InfraError>;

    /// Submits a power-off task.
    async fn power_off(&self, reference: &str) -> Result<TaskRef, InfraError>;

    /// Blocks until a task completes, returning its fault on failure.
    async fn wait_for_task(&self, task: &TaskRef) -> Result<(), InfraError>;

    /// Starts a program inside the guest and returns its guest PID.
    async fn start_program(
        &self,
        reference: &str,
        auth: &GuestAuth,
        spec: &ProgramSpec,
    ) -> Result<i64, InfraError>;

    /// Blocks until `key` has a value in the VM metadata and returns it.
    async fn wait_for_metadata_key(&self, reference: &str, key: &str) -> Result<String, InfraError>;

    /// Blocks until the VM reports `target` as its power state.
    async fn wait_for_power_state(&self, reference: &str, target: PowerState) -> Result<(), InfraError>;
}

/// Opaque, shared reference to one VM on the infrastructure.
///
/// Carries the managed-object reference together with the client able to act
/// on it. Always passed around as `Arc<InstanceHandle>`.
pub struct InstanceHandle {
    reference: String,
    infra: Arc<dyn Infrastructure>,
}

impl InstanceHandle {
    /// Wraps a managed-object reference and the client that owns it.
    #[must_use]
    pub fn new(reference: impl Into<String>, infra: Arc<dyn Infrastructure>) -> Arc<Self> {
        Arc::new(Self {
            reference: reference.into(),
            infra,
        })
    }

    /// Managed-object reference of the VM.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Client that operates on the VM.
    #[must_use]
    pub fn infra(&self) -> &dyn Infrastructure {
        self.infra.as_ref()
    }
}

impl fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}
