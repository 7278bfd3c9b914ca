//! Classification of lifecycle failures.
//!
//! Power operations race with the guest: a VM can shut itself down between
//! the moment a power-off is decided and the moment the task runs. Those
//! faults prove the VM is already where the caller wanted it.

use vesta_common::constants::VM_NOT_SUSPENDED_KEY;
use vesta_common::types::PowerState;

use crate::error::LifecycleError;
use crate::infra::Fault;

/// What the caller should do with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The desired end state was reached anyway; report success.
    Absorb,
    /// The step timed out; move on to the next, stronger step.
    Retry,
    /// Give up and surface the error.
    Fatal,
}

/// Classifies a lifecycle failure.
#[must_use]
pub fn classify(err: &LifecycleError) -> Disposition {
    if let Some(fault) = err.fault() {
        return classify_fault(fault);
    }
    match err {
        LifecycleError::PowerStateTimeout { .. } => Disposition::Retry,
        _ => Disposition::Fatal,
    }
}

/// Classifies a structured task fault.
#[must_use]
pub fn classify_fault(fault: &Fault) -> Disposition {
    match fault {
        Fault::InvalidPowerState {
            existing: PowerState::PoweredOff,
            ..
        } => Disposition::Absorb,
        Fault::GenericVmConfig { messages }
            if messages.first().is_some_and(|m| m.key == VM_NOT_SUSPENDED_KEY) =>
        {
            Disposition::Absorb
        }
        Fault::InvalidPowerState { .. }
        | Fault::GenericVmConfig { .. }
        | Fault::TaskInProgress { .. }
        | Fault::Other { .. } => Disposition::Fatal,
    }
}
