//! Kernel session management.
//!
//! A session is one running kernel plus the record that lets later
//! invocations find it again. This module stores and validates that
//! record, launches kernels, and tears them down.

pub mod kernelspec;
pub mod probe;
mod provisioner;
mod record;
mod store;
mod supervisor;
mod teardown;

pub use provisioner::{JupyterProvisioner, KernelProvisioner, LaunchedKernel};
pub use record::{SessionRecord, Staleness};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, STATE_FILE_NAME};
pub use supervisor::SessionSupervisor;
pub use teardown::{
    StepOutcome, TeardownPolicy, TeardownReport, TeardownStep, DEFAULT_SHUTDOWN_GRACE,
};
