//! Start/stop/restart of the single kernel session.

use std::fs;
use std::io::ErrorKind;

use tracing::{info, warn};

use super::teardown::{StepOutcome, TeardownPolicy, TeardownReport, TeardownStep};
use super::{probe, KernelProvisioner, SessionRecord, SessionStore};
use crate::error::QkernelError;
use crate::Result;

/// Owns the lifecycle of the one tracked kernel.
///
/// Note: there is no lock between separate controller processes. Two
/// concurrent `start` calls can both see an empty store and both launch a
/// kernel; only the last one saved is tracked.
#[derive(Debug)]
pub struct SessionSupervisor<S, P> {
    store: S,
    provisioner: P,
    policy: TeardownPolicy,
}

impl<S: SessionStore, P: KernelProvisioner> SessionSupervisor<S, P> {
    /// Create a supervisor with the default teardown policy.
    pub fn new(store: S, provisioner: P) -> Self {
        Self {
            store,
            provisioner,
            policy: TeardownPolicy::default(),
        }
    }

    /// Replace the teardown policy.
    pub fn with_policy(mut self, policy: TeardownPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn provisioner(&self) -> &P {
        &self.provisioner
    }

    pub fn policy(&self) -> &TeardownPolicy {
        &self.policy
    }

    /// The live session, if any.
    pub fn current(&self) -> Result<Option<SessionRecord>> {
        self.store.load()
    }

    /// Whether a live session is recorded.
    pub fn is_running(&self) -> Result<bool> {
        Ok(self.store.load()?.is_some())
    }

    /// Launch a kernel and record it.
    pub async fn start(&self, kernel_name: &str) -> Result<SessionRecord> {
        if let Some(existing) = self.store.load()? {
            return Err(QkernelError::AlreadyRunning { pid: existing.pid });
        }

        let launched = self.provisioner.launch(kernel_name).await?;
        let record = SessionRecord::new(launched.connection_file, kernel_name, launched.pid);

        if let Err(e) = self.store.save(&record) {
            // An unrecorded kernel could never be stopped again.
            warn!(pid = record.pid, error = %e, "failed to persist session; killing kernel");
            let _ = probe::terminate(record.pid);
            let _ = fs::remove_file(&record.connection_file);
            return Err(e);
        }

        info!(pid = record.pid, kernel = kernel_name, "session started");
        Ok(record)
    }

    /// Tear the session down.
    ///
    /// Returns `false` when nothing was running.
    pub async fn stop(&self) -> Result<bool> {
        Ok(self.stop_with_report().await?.is_some())
    }

    /// Tear the session down and report what each step did.
    ///
    /// Shutdown, termination and file removal failures are recorded, not
    /// returned. Only a failure to clear the record itself is an error.
    /// A record that cannot be read is cleared and reported as no session.
    pub async fn stop_with_report(&self) -> Result<Option<TeardownReport>> {
        let record = match self.store.load() {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(None),
            Err(e) => {
                // Nothing to tear down without a record; still untrack it.
                warn!(error = %e, "unreadable session record; clearing it");
                self.store.clear()?;
                return Ok(None);
            }
        };

        let mut report = TeardownReport::default();
        let mut clear_error = None;

        for step in TeardownStep::ORDER {
            if !self.policy.should_run(step, &report) {
                report.record(step, StepOutcome::Skipped);
                continue;
            }

            let outcome = match step {
                TeardownStep::GracefulShutdown => StepOutcome::from_result(
                    self.provisioner
                        .shutdown(&record, self.policy.shutdown_grace)
                        .await,
                ),
                TeardownStep::ForceTerminate => {
                    info!(pid = record.pid, "terminating kernel");
                    StepOutcome::from_result(probe::terminate(record.pid))
                }
                TeardownStep::RemoveConnectionFile => {
                    match fs::remove_file(&record.connection_file) {
                        Err(e) if e.kind() != ErrorKind::NotFound => StepOutcome::Failed(e.to_string()),
                        _ => StepOutcome::Succeeded,
                    }
                }
                TeardownStep::ClearRecord => match self.store.clear() {
                    Ok(()) => StepOutcome::Succeeded,
                    Err(e) => {
                        let outcome = StepOutcome::Failed(e.to_string());
                        clear_error = Some(e);
                        outcome
                    }
                },
            };
            report.record(step, outcome);
        }

        if let Some(e) = clear_error {
            return Err(e);
        }

        info!(pid = record.pid, clean = report.is_clean(), "session stopped");
        Ok(Some(report))
    }

    /// Stop whatever is running, then start fresh.
    ///
    /// If the old kernel survived teardown it keeps running untracked next
    /// to the new one.
    pub async fn restart(&self, kernel_name: &str) -> Result<SessionRecord> {
        if let Err(e) = self.stop().await {
            warn!(error = %e, "stop during restart failed");
        }
        self.start(kernel_name).await
    }
}
