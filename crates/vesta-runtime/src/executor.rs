//! Typed executor configuration decoded from VM metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vesta_common::types::ContainerId;

/// Command line of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cmd {
    /// Path of the executable inside the guest.
    pub path: String,
    /// Arguments, including `argv[0]` if the guest expects it.
    pub args: Vec<String>,
}

/// A process the guest runs on behalf of the container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier. The primary session shares the container id.
    pub id: String,
    /// Command to run.
    pub cmd: Cmd,
    /// `KEY=value` environment entries.
    pub env: Vec<String>,
    /// Working directory inside the guest.
    pub working_dir: Option<String>,
    /// Signal used for a graceful stop. `None` means `TERM`.
    pub stop_signal: Option<String>,
    /// Launch status written by the guest: `"true"` or a failure detail.
    pub started: Option<String>,
    /// Exit status written by the guest once the session ended.
    pub exit_status: Option<i32>,
}

/// Configuration shared between the host and the guest executor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Container identifier.
    pub id: ContainerId,
    /// Human-readable container name.
    pub name: String,
    /// Sessions keyed by session id.
    pub sessions: BTreeMap<String, Session>,
}

impl ExecutorConfig {
    /// Creates an empty configuration for the given container.
    #[must_use]
    pub fn new(id: ContainerId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// The session whose id matches the container id.
    #[must_use]
    pub fn primary_session(&self) -> Option<&Session> {
        self.sessions.get(self.id.as_str())
    }
}
