//! Starting and stopping kernel processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use super::kernelspec::{self, find_kernel_spec};
use super::{probe, SessionRecord};
use crate::error::QkernelError;
use crate::transport::{ConnectionInfo, KernelClient};
use crate::Result;

/// A freshly started kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedKernel {
    pub connection_file: PathBuf,
    pub pid: u32,
}

/// Creates kernel processes and asks them to exit.
#[async_trait]
pub trait KernelProvisioner: Send + Sync {
    /// Start a kernel of the given kind.
    ///
    /// Fails with [`QkernelError::SpawnFailed`] when no process could be
    /// created.
    async fn launch(&self, kernel_name: &str) -> Result<LaunchedKernel>;

    /// Ask the kernel to exit and wait up to `grace` for it to do so.
    async fn shutdown(&self, record: &SessionRecord, grace: Duration) -> Result<()>;
}

/// Provisions Jupyter kernels from installed kernelspecs.
#[derive(Debug, Clone)]
pub struct JupyterProvisioner {
    runtime_dir: PathBuf,
    search_dirs: Vec<PathBuf>,
}

impl JupyterProvisioner {
    /// Write connection files into `runtime_dir`.
    pub fn new(runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime_dir: runtime_dir.into(),
            search_dirs: kernelspec::data_dirs(),
        }
    }

    /// Override the kernelspec search path.
    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    /// Directory holding connection files.
    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    fn spawn(&self, kernel_name: &str) -> Result<LaunchedKernel> {
        let resolved = find_kernel_spec(kernel_name, &self.search_dirs)
            .map_err(|e| QkernelError::SpawnFailed(e.to_string()))?;

        let info = ConnectionInfo::allocate(kernel_name)?;
        let connection_file = self
            .runtime_dir
            .join(format!("kernel-{}.json", Uuid::new_v4()));
        info.write_to(&connection_file)?;

        let argv = resolved.command_line(&connection_file);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| QkernelError::SpawnFailed("empty kernel command".into()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&resolved.spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Own process group: the kernel must outlive this invocation and
        // ignore Ctrl-C aimed at it.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|e| {
            let _ = fs::remove_file(&connection_file);
            QkernelError::SpawnFailed(format!("{program}: {e}"))
        })?;

        // Dropping a std Child neither kills nor waits on it.
        let pid = child.id();
        debug!(pid, command = ?argv, "kernel process spawned");

        Ok(LaunchedKernel {
            connection_file,
            pid,
        })
    }
}

#[async_trait]
impl KernelProvisioner for JupyterProvisioner {
    async fn launch(&self, kernel_name: &str) -> Result<LaunchedKernel> {
        let launched = self.spawn(kernel_name)?;
        info!(pid = launched.pid, kernel = kernel_name, "kernel started");
        Ok(launched)
    }

    async fn shutdown(&self, record: &SessionRecord, grace: Duration) -> Result<()> {
        let info = ConnectionInfo::read_from(&record.connection_file)?;

        let mut client = tokio::time::timeout(grace, KernelClient::open(info))
            .await
            .map_err(|_| QkernelError::ShutdownFailed("control channel unreachable".into()))??;
        client.request_shutdown(grace).await?;
        client.disconnect();

        if probe::wait_for_exit(record.pid, grace).await {
            info!(pid = record.pid, "kernel shut down");
            Ok(())
        } else {
            Err(QkernelError::ShutdownFailed(format!(
                "pid {} still running after {grace:?}",
                record.pid
            )))
        }
    }
}
