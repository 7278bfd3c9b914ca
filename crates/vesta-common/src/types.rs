//! Domain primitive types used across the Vesta workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a container instance.
///
/// The same value names the backing VM's primary session and is the user the
/// guest agent authenticates as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Power state of a VM as reported by the hypervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    /// The VM is running.
    PoweredOn,
    /// The VM is off.
    PoweredOff,
    /// The VM is suspended to memory or disk.
    Suspended,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoweredOn => write!(f, "poweredOn"),
            Self::PoweredOff => write!(f, "poweredOff"),
            Self::Suspended => write!(f, "suspended"),
        }
    }
}

/// Lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerState {
    /// Container has been created but not yet observed on the infrastructure.
    Created,
    /// Container is actively running.
    Running,
    /// Container has been stopped.
    Stopped,
}

impl From<PowerState> for ContainerState {
    fn from(state: PowerState) -> Self {
        match state {
            PowerState::PoweredOn => Self::Running,
            PowerState::PoweredOff | PowerState::Suspended => Self::Stopped,
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_state_uses_hypervisor_spelling() {
        let json = serde_json::to_string(&PowerState::PoweredOff).unwrap();
        assert_eq!(json, "\"poweredOff\"");
        assert_eq!(PowerState::PoweredOn.to_string(), "poweredOn");
    }

    #[test]
    fn suspended_vm_counts_as_stopped() {
        assert_eq!(ContainerState::from(PowerState::Suspended), ContainerState::Stopped);
        assert_eq!(ContainerState::from(PowerState::PoweredOn), ContainerState::Running);
    }
}
