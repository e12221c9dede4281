//! The seam between the execution engine and a concrete transport.

use std::time::Duration;

use async_trait::async_trait;

use crate::protocol::Notification;
use crate::session::SessionRecord;
use crate::Result;

/// A bidirectional path to one running kernel.
#[async_trait]
pub trait KernelChannel: Send {
    /// Submit code for execution and return the request's correlation token.
    async fn submit_execute(&mut self, code: &str) -> Result<String>;

    /// Wait for the next notification from the kernel.
    ///
    /// Never times out on its own; callers bound it.
    async fn next_notification(&mut self) -> Result<Notification>;

    /// Release local resources. The kernel keeps running.
    fn disconnect(self: Box<Self>) {}
}

/// Opens channels to the kernel described by a session record.
#[async_trait]
pub trait KernelConnector: Send + Sync {
    /// Attach and wait until the kernel reports ready.
    async fn connect(
        &self,
        record: &SessionRecord,
        ready_timeout: Duration,
    ) -> Result<Box<dyn KernelChannel>>;
}
