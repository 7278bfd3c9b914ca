//! VM-backed container lifecycle for the Vesta runtime.
//!
//! Each container runs in its own VM on a hypervisor-managed cluster. This
//! crate maps container semantics onto the VM-level primitives the cluster
//! offers:
//!
//! - [`Snapshot`] holds one consistent view of a container's VM and its
//!   decoded [`ExecutorConfig`](executor::ExecutorConfig);
//!   [`Controller::refresh`] replaces it wholesale.
//! - [`Controller::start`] powers the VM on and waits for the guest's launch
//!   status.
//! - [`Controller::shutdown`] escalates through the stop signals,
//!   [`Controller::kill`] goes straight to `KILL`, and [`Controller::stop`]
//!   and `kill` fall back to [`Controller::poweroff`], which treats an
//!   already-off VM as success.
//!
//! The cluster itself is reached through the [`Infrastructure`](infra::Infrastructure)
//! trait.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod codec;
pub mod controller;
pub mod error;
pub mod executor;
pub mod fault;
pub mod guest;
pub mod infra;
pub mod lifecycle;
pub mod power;
pub mod snapshot;
pub mod waiter;

pub use controller::Controller;
pub use error::{LifecycleError, Result, WaitError};
pub use snapshot::Snapshot;
