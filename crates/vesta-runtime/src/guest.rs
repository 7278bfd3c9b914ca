//! Guest program execution, used to deliver signals to the container's
//! processes through the guest agent.

use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::controller::{guarded, require_handle, Controller};
use crate::error::Result;
use crate::infra::{GuestAuth, ProgramSpec};
use crate::snapshot::Snapshot;

/// Name of a POSIX signal as understood by the guest's `kill` program,
/// without the `SIG` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signal(String);

impl Signal {
    /// Parses a signal name. `SIGTERM`, `sigterm`, and `TERM` are equivalent.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
        Self(bare.to_string())
    }

    /// `TERM`, the default graceful stop signal.
    #[must_use]
    pub fn term() -> Self {
        Self("TERM".into())
    }

    /// `KILL`, the signal that cannot be caught.
    #[must_use]
    pub fn kill() -> Self {
        Self("KILL".into())
    }

    /// Bare signal name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Controller {
    /// Starts `name` with the argument string `args` inside the guest,
    /// authenticating as the container id with no password.
    ///
    /// # Errors
    ///
    /// Returns `NotYetExist` when the snapshot has no VM, `Cancelled` when
    /// the token fires, or the guest agent's error.
    pub async fn start_guest_program(
        &self,
        snapshot: &Snapshot,
        name: &str,
        args: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let handle = require_handle(snapshot)?;

        let auth = GuestAuth {
            username: snapshot.id().to_string(),
            password: None,
        };
        let spec = ProgramSpec {
            program_path: name.to_string(),
            arguments: args.to_string(),
        };

        let pid = guarded(
            cancel,
            handle.infra().start_program(handle.reference(), &auth, &spec),
        )
        .await?;
        tracing::debug!(id = %snapshot.id(), program = name, args, pid, "guest program started");
        Ok(())
    }

    /// Delivers `signal` by running the configured signal program in the
    /// guest.
    pub(crate) async fn send_signal(
        &self,
        snapshot: &Snapshot,
        signal: &Signal,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tracing::info!(id = %snapshot.id(), signal = %signal, "sending kill -{signal} {}", snapshot.id());
        self.start_guest_program(snapshot, &self.config().signal_program, signal.as_str(), cancel)
            .await
    }
}
