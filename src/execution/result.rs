//! Execution result types.

use std::time::Duration;

use crate::protocol::MimeBundle;

/// An exception raised by the executed code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionFailure {
    /// Exception class name, e.g. `NameError`.
    pub kind: String,
    /// Exception message.
    pub message: String,
    /// Formatted traceback lines (may contain ANSI colour codes).
    pub traceback: Vec<String>,
}

/// State of one execution request.
///
/// `Submitted -> Draining -> Completed` is the normal path; the loop can
/// also end in `TimedOut` or, if the channel itself breaks, `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionPhase {
    /// Request sent, nothing correlated received yet.
    #[default]
    Submitted,
    /// At least one correlated notification received.
    Draining,
    /// The kernel reported idle for this request.
    Completed,
    /// A receive or the whole call ran out of time.
    TimedOut,
    /// The notification stream failed.
    Disconnected,
}

impl ExecutionPhase {
    /// Whether the loop stops in this phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Disconnected)
    }
}

/// Everything one execution request produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    /// Concatenated stdout fragments, in arrival order.
    pub stdout: String,
    /// Concatenated stderr fragments, in arrival order.
    pub stderr: String,
    /// Value of the final expression (`execute_result`).
    pub value: Option<MimeBundle>,
    /// Rich outputs shown while running, in arrival order.
    pub displays: Vec<MimeBundle>,
    /// The exception raised, if any.
    pub failure: Option<ExecutionFailure>,
    /// Where the request ended up.
    pub phase: ExecutionPhase,
    /// Wall time from submission to return.
    pub duration: Duration,
}

impl ExecutionResult {
    /// Create an empty result for a just-submitted request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the code raised.
    pub fn has_failure(&self) -> bool {
        self.failure.is_some()
    }

    /// Whether the kernel signalled completion.
    pub fn completed(&self) -> bool {
        self.phase == ExecutionPhase::Completed
    }

    /// Whether the wait gave up before completion.
    pub fn timed_out(&self) -> bool {
        self.phase == ExecutionPhase::TimedOut
    }

    /// `text/plain` form of the final expression's value.
    pub fn primary_text(&self) -> Option<&str> {
        self.value.as_ref().and_then(MimeBundle::plain_text)
    }
}
