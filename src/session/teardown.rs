//! Best-effort session teardown.
//!
//! Stopping a session runs a fixed list of independently fallible steps.
//! A failing step is recorded and the next one still runs; the record is
//! cleared last no matter what happened before, so a half-dead kernel can
//! never leave the store stuck in a "running" state.

use std::fmt;
use std::time::Duration;

use tracing::warn;

/// Default time a kernel gets to exit after a shutdown request.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// One teardown step, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    /// Shutdown request over the control channel.
    GracefulShutdown,
    /// SIGTERM to the recorded pid.
    ForceTerminate,
    /// Delete the connection file.
    RemoveConnectionFile,
    /// Delete the session record.
    ClearRecord,
}

impl TeardownStep {
    /// All steps in the order they run.
    pub const ORDER: [TeardownStep; 4] = [
        Self::GracefulShutdown,
        Self::ForceTerminate,
        Self::RemoveConnectionFile,
        Self::ClearRecord,
    ];
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GracefulShutdown => "graceful shutdown",
            Self::ForceTerminate => "forced termination",
            Self::RemoveConnectionFile => "connection file removal",
            Self::ClearRecord => "record removal",
        };
        f.write_str(name)
    }
}

/// Result of a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    /// Not needed, or disabled by policy.
    Skipped,
    Failed(String),
}

impl StepOutcome {
    pub fn from_result<E: fmt::Display>(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::Succeeded,
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// How teardown behaves.
///
/// Every enabled step runs even after earlier failures, and
/// [`TeardownStep::ClearRecord`] always runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownPolicy {
    /// How long a graceful shutdown may take.
    pub shutdown_grace: Duration,
    /// Attempt the shutdown request before signalling.
    pub graceful: bool,
    /// Signal the process when graceful shutdown did not succeed.
    pub force_on_failure: bool,
    /// Delete the connection file.
    pub remove_connection_file: bool,
}

impl Default for TeardownPolicy {
    fn default() -> Self {
        Self {
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            graceful: true,
            force_on_failure: true,
            remove_connection_file: true,
        }
    }
}

impl TeardownPolicy {
    /// Set the graceful shutdown window.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Whether `step` should run given what happened so far.
    pub fn should_run(&self, step: TeardownStep, report: &TeardownReport) -> bool {
        match step {
            TeardownStep::GracefulShutdown => self.graceful,
            TeardownStep::ForceTerminate => {
                self.force_on_failure
                    && report.outcome(TeardownStep::GracefulShutdown) != Some(&StepOutcome::Succeeded)
            }
            TeardownStep::RemoveConnectionFile => self.remove_connection_file,
            TeardownStep::ClearRecord => true,
        }
    }
}

/// What each step did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    outcomes: Vec<(TeardownStep, StepOutcome)>,
}

impl TeardownReport {
    /// Record a step's outcome.
    pub fn record(&mut self, step: TeardownStep, outcome: StepOutcome) {
        if let StepOutcome::Failed(reason) = &outcome {
            warn!(%step, %reason, "teardown step failed; continuing");
        }
        self.outcomes.push((step, outcome));
    }

    /// Outcome of a step, if it was recorded.
    pub fn outcome(&self, step: TeardownStep) -> Option<&StepOutcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, outcome)| outcome)
    }

    /// All outcomes in execution order.
    pub fn outcomes(&self) -> &[(TeardownStep, StepOutcome)] {
        &self.outcomes
    }

    /// Steps that failed.
    pub fn failures(&self) -> impl Iterator<Item = TeardownStep> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_failure())
            .map(|(step, _)| *step)
    }

    /// Whether every step that ran succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}
