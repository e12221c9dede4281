//! Subcommand implementations behind the binary.

use std::io::{self, Write};
use std::path::Path;

use tracing::info;

use crate::cli::{Command, RunArgs};
use crate::config::Config;
use crate::document::{file_stem, parse_qmd, parse_selector_list, select_cells};
use crate::execution::{run_batch, BatchOptions};
use crate::output::{clear_file_cache, print_summary, OutputRenderer};
use crate::session::{
    FileSessionStore, JupyterProvisioner, KernelProvisioner, SessionStore, SessionSupervisor,
};
use crate::transport::{KernelConnector, ZmqConnector};
use crate::Result;

/// How a subcommand ended when it did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    /// At least one cell raised or did not complete.
    CellsFailed,
}

impl Status {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::CellsFailed => 1,
        }
    }
}

/// Supervisor over the on-disk session record and real kernels.
pub fn supervisor(config: &Config) -> SessionSupervisor<FileSessionStore, JupyterProvisioner> {
    SessionSupervisor::new(
        FileSessionStore::new(&config.paths.state_dir),
        JupyterProvisioner::new(&config.paths.runtime_dir),
    )
    .with_policy(config.teardown_policy())
}

/// Run `command` against real kernels, printing to stdout.
pub async fn dispatch(command: &Command, config: &Config) -> Result<Status> {
    let supervisor = supervisor(config);
    let mut out = io::stdout();
    dispatch_with(command, config, &supervisor, &ZmqConnector, &mut out).await
}

/// Run `command` with explicit collaborators.
///
/// Lifecycle messages go to `out`; `run` renders cell output to the
/// process's stdout/stderr.
pub async fn dispatch_with<S, P, K, W>(
    command: &Command,
    config: &Config,
    supervisor: &SessionSupervisor<S, P>,
    connector: &K,
    out: &mut W,
) -> Result<Status>
where
    S: SessionStore,
    P: KernelProvisioner,
    K: KernelConnector + ?Sized,
    W: Write,
{
    match command {
        Command::Start { .. } => {
            let record = supervisor.start(&config.kernel.name).await?;
            writeln!(out, "Started {} kernel (PID: {})", record.kernel_name, record.pid)?;
            writeln!(out, "Connection file: {}", record.connection_file.display())?;
        }
        Command::Stop => match supervisor.stop_with_report().await? {
            Some(report) => {
                writeln!(out, "Kernel stopped.")?;
                for step in report.failures() {
                    writeln!(out, "  warning: {step} failed")?;
                }
            }
            None => writeln!(out, "No kernel is running.")?,
        },
        Command::Restart { .. } => {
            let record = supervisor.restart(&config.kernel.name).await?;
            writeln!(out, "Restarted {} kernel (PID: {})", record.kernel_name, record.pid)?;
        }
        Command::Status => match supervisor.current()? {
            Some(record) => {
                writeln!(out, "Kernel is running:")?;
                writeln!(out, "  Name: {}", record.kernel_name)?;
                writeln!(out, "  PID: {}", record.pid)?;
                writeln!(out, "  Connection file: {}", record.connection_file.display())?;
            }
            None => writeln!(out, "No kernel is running.")?,
        },
        Command::Run(run) => return run_file(run, config, supervisor, connector, out).await,
    }
    Ok(Status::Success)
}

async fn run_file<S, P, K, W>(
    run: &RunArgs,
    config: &Config,
    supervisor: &SessionSupervisor<S, P>,
    connector: &K,
    out: &mut W,
) -> Result<Status>
where
    S: SessionStore,
    P: KernelProvisioner,
    K: KernelConnector + ?Sized,
    W: Write,
{
    let stem = file_stem(&run.file);
    writeln!(out, "Clearing cache for {stem}...")?;
    let file_cache = clear_file_cache(&config.paths.cache_dir, &stem)?;

    let all_cells = parse_qmd(&run.file)?;
    let shown = run.file.display();
    if all_cells.is_empty() {
        writeln!(out, "No code cells found in {shown}")?;
        return Ok(Status::Success);
    }
    writeln!(out, "Found {} code cell(s) in {shown}", all_cells.len())?;

    let cells = match run.cells.as_deref() {
        Some(list) => select_cells(&all_cells, &parse_selector_list(list))?,
        None => all_cells,
    };
    writeln!(out, "Running {} cell(s)...", cells.len())?;
    out.flush()?;

    let options = BatchOptions {
        kernel_name: config.kernel.name.clone(),
        ready_timeout: config.ready_timeout(),
        execute: config.execute_options(),
    };
    let mut renderer = OutputRenderer::stdio(file_cache);
    info!(file = %shown, cells = cells.len(), "running batch");
    let outcome = run_batch(supervisor, connector, &cells, &options, &mut renderer).await?;

    if outcome.temporary_session {
        writeln!(out, "\nStopped temporary kernel.")?;
    }
    print_summary(out, &outcome)?;

    Ok(if outcome.is_success() {
        Status::Success
    } else {
        Status::CellsFailed
    })
}

/// Whether `path` names an existing document.
pub fn document_exists(path: &Path) -> bool {
    path.is_file()
}
