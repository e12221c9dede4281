//! Running a sequence of cells against the session kernel.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use super::engine::{ExecuteOptions, ExecutionEngine};
use super::result::ExecutionResult;
use crate::document::CodeCell;
use crate::error::QkernelError;
use crate::session::{KernelProvisioner, SessionStore, SessionSupervisor};
use crate::transport::{KernelChannel, KernelConnector};
use crate::Result;

/// Receives each cell's result as the batch runs.
pub trait ResultSink {
    /// Called once before anything else; `temporary` is set when the batch
    /// had to start its own kernel.
    fn session_ready(&mut self, _temporary: bool) {}

    /// Called before a cell is submitted.
    fn cell_started(&mut self, _cell: &CodeCell) {}

    /// Called with a cell's result. Returns the files written for it.
    fn cell_finished(&mut self, cell: &CodeCell, result: &ExecutionResult) -> Vec<PathBuf>;
}

/// Settings for one batch.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Kernel to start when no session is running.
    pub kernel_name: String,
    /// How long to wait for the kernel to become ready.
    pub ready_timeout: Duration,
    /// Limits applied to every cell.
    pub execute: ExecuteOptions,
}

/// Totals for a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Cells that produced a result.
    pub executed: usize,
    /// Cells whose code raised.
    pub errors: usize,
    /// Cells that did not complete (timed out or lost the channel).
    pub incomplete: usize,
    /// Files saved across all cells, in order.
    pub saved: Vec<PathBuf>,
    /// Whether a temporary kernel was started (and stopped) for this batch.
    pub temporary_session: bool,
}

impl BatchOutcome {
    /// Whether every cell completed without raising.
    pub fn is_success(&self) -> bool {
        self.errors == 0 && self.incomplete == 0
    }
}

/// Run `cells` in order on the session kernel.
///
/// When no session is running a temporary one is started and always
/// stopped afterwards, even if connecting or executing fails. A session
/// that already existed is left running.
pub async fn run_batch<S, P, K, R>(
    supervisor: &SessionSupervisor<S, P>,
    connector: &K,
    cells: &[CodeCell],
    options: &BatchOptions,
    sink: &mut R,
) -> Result<BatchOutcome>
where
    S: SessionStore,
    P: KernelProvisioner,
    K: KernelConnector + ?Sized,
    R: ResultSink + ?Sized,
{
    let temporary = if supervisor.is_running()? {
        false
    } else {
        info!(kernel = %options.kernel_name, "starting temporary kernel");
        supervisor.start(&options.kernel_name).await?;
        true
    };
    sink.session_ready(temporary);

    let outcome = run_cells(supervisor, connector, cells, options, sink).await;

    if temporary {
        info!("stopping temporary kernel");
        if let Err(e) = supervisor.stop().await {
            warn!(error = %e, "failed to stop temporary kernel");
        }
    }

    outcome.map(|mut outcome| {
        outcome.temporary_session = temporary;
        outcome
    })
}

async fn run_cells<S, P, K, R>(
    supervisor: &SessionSupervisor<S, P>,
    connector: &K,
    cells: &[CodeCell],
    options: &BatchOptions,
    sink: &mut R,
) -> Result<BatchOutcome>
where
    S: SessionStore,
    P: KernelProvisioner,
    K: KernelConnector + ?Sized,
    R: ResultSink + ?Sized,
{
    let record = supervisor.current()?.ok_or(QkernelError::NoSessionRunning)?;
    let mut channel = connector.connect(&record, options.ready_timeout).await?;
    let engine = ExecutionEngine::new(options.execute);
    let mut outcome = BatchOutcome::default();

    for cell in cells {
        sink.cell_started(cell);
        let result = match engine.execute(channel.as_mut(), &cell.source).await {
            Ok(result) => result,
            Err(e) => {
                channel.disconnect();
                return Err(e);
            }
        };

        outcome.executed += 1;
        if result.has_failure() {
            outcome.errors += 1;
        }
        if !result.completed() {
            outcome.incomplete += 1;
        }
        outcome.saved.extend(sink.cell_finished(cell, &result));
    }

    channel.disconnect();
    Ok(outcome)
}
