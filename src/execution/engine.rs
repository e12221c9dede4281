//! Execution request/notification matching.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::result::{ExecutionFailure, ExecutionPhase, ExecutionResult};
use crate::protocol::{KernelStatus, Notification, NotificationKind, StreamName};
use crate::transport::KernelChannel;
use crate::Result;

/// Default wait for each notification.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(600);

/// Time limits for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Longest wait for any single notification.
    pub receive_timeout: Duration,
    /// Cap on the whole call, if any.
    pub overall_timeout: Option<Duration>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            overall_timeout: None,
        }
    }
}

impl ExecuteOptions {
    /// Set the per-notification timeout.
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Set the whole-call timeout.
    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = Some(timeout);
        self
    }

    /// How long the next receive may wait, or `None` once the overall
    /// budget is spent.
    fn next_wait(&self, started: Instant) -> Option<Duration> {
        match self.overall_timeout {
            None => Some(self.receive_timeout),
            Some(total) => {
                let left = total.saturating_sub(started.elapsed());
                (!left.is_zero()).then(|| left.min(self.receive_timeout))
            }
        }
    }
}

/// Folds the notifications of one request into its result.
struct Drain<'a> {
    token: &'a str,
    phase: ExecutionPhase,
    result: ExecutionResult,
}

impl<'a> Drain<'a> {
    fn new(token: &'a str) -> Self {
        Self {
            token,
            phase: ExecutionPhase::Submitted,
            result: ExecutionResult::new(),
        }
    }

    fn absorb(&mut self, notification: Notification) {
        if !notification.belongs_to(self.token) {
            debug!(parent = ?notification.parent_id, "discarding uncorrelated notification");
            return;
        }
        self.phase = ExecutionPhase::Draining;

        match notification.kind {
            NotificationKind::Stream { name: StreamName::Stdout, text } => {
                self.result.stdout.push_str(&text);
            }
            NotificationKind::Stream { name: StreamName::Stderr, text } => {
                self.result.stderr.push_str(&text);
            }
            NotificationKind::ExecuteResult { data } => {
                if self.result.value.is_some() {
                    warn!(token = self.token, "second execute_result for one request; keeping the latest");
                }
                self.result.value = Some(data);
            }
            NotificationKind::DisplayData { data } => self.result.displays.push(data),
            NotificationKind::Error {
                ename,
                evalue,
                traceback,
            } => {
                if self.result.failure.is_some() {
                    warn!(token = self.token, kind = %ename, "second error for one request; keeping the latest");
                }
                self.result.failure = Some(ExecutionFailure {
                    kind: ename,
                    message: evalue,
                    traceback,
                });
            }
            NotificationKind::Status(KernelStatus::Idle) => {
                self.phase = ExecutionPhase::Completed;
            }
            NotificationKind::Status(_) | NotificationKind::Other(_) => {}
        }
    }

    fn finish(mut self, phase: ExecutionPhase, started: Instant) -> ExecutionResult {
        self.result.phase = phase;
        self.result.duration = started.elapsed();
        self.result
    }
}

/// Runs code on a kernel channel and collects what it produces.
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    options: ExecuteOptions,
}

impl ExecutionEngine {
    /// Create an engine with the given limits.
    pub fn new(options: ExecuteOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExecuteOptions {
        &self.options
    }

    /// Execute `code` and wait for the kernel to go idle.
    ///
    /// Running out of time is not an error: whatever arrived so far is
    /// returned with [`ExecutionPhase::TimedOut`]. The kernel is not
    /// interrupted and may still be running the code.
    pub async fn execute<C>(&self, channel: &mut C, code: &str) -> Result<ExecutionResult>
    where
        C: KernelChannel + ?Sized,
    {
        let started = Instant::now();
        let token = channel.submit_execute(code).await?;
        let mut drain = Drain::new(&token);

        while !drain.phase.is_terminal() {
            let Some(wait) = self.options.next_wait(started) else {
                warn!(%token, "execution exceeded overall timeout");
                return Ok(drain.finish(ExecutionPhase::TimedOut, started));
            };

            match tokio::time::timeout(wait, channel.next_notification()).await {
                Ok(Ok(notification)) => drain.absorb(notification),
                Ok(Err(e)) => {
                    warn!(%token, error = %e, "notification stream failed");
                    return Ok(drain.finish(ExecutionPhase::Disconnected, started));
                }
                Err(_) => {
                    warn!(%token, ?wait, "no notification within timeout");
                    return Ok(drain.finish(ExecutionPhase::TimedOut, started));
                }
            }
        }

        debug!(%token, elapsed = ?started.elapsed(), "execution completed");
        let phase = drain.phase;
        Ok(drain.finish(phase, started))
    }
}
