//! System-wide constants and defaults.

/// Default window a graceful stop waits for power-off after each signal.
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;

/// Window `kill` waits for power-off after delivering `KILL`. Not tunable.
pub const KILL_TIMEOUT_SECS: u64 = 10;

/// Upper bound on waiting for the guest to report the launch status of the
/// primary session after power-on.
pub const DEFAULT_LAUNCH_STATUS_TIMEOUT_SECS: u64 = 3 * 60;

/// Program started inside the guest to deliver signals.
pub const DEFAULT_SIGNAL_PROGRAM: &str = "kill";

/// Prefix under which the executor configuration lives in the VM metadata.
pub const DEFAULT_METADATA_PREFIX: &str = "guestinfo.vesta";

/// Value the guest writes to the `Started` key once the session launched.
pub const LAUNCH_SUCCESS: &str = "true";

/// Fault message key reported when a power-off was invalidated by a guest
/// shutting itself down at the same time.
pub const VM_NOT_SUSPENDED_KEY: &str = "msg.suspend.powerOff.notsuspended";
