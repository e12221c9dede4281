//! # qkernel
//!
//! Execute Quarto code cells through a persistent Jupyter kernel.
//!
//! A kernel is started once and tracked by a small on-disk record, so
//! later invocations can reuse it: variables defined by one `run` are
//! visible to the next. Cells are submitted one at a time and their
//! output is gathered by correlating kernel notifications with the
//! request that caused them.
//!
//! ## Features
//!
//! - **Session lifecycle**: start, stop, restart and status of one
//!   background kernel, with self-healing of stale records
//! - **Best-effort teardown**: graceful shutdown, forced termination and
//!   record removal as independent steps
//! - **Execution engine**: per-request output collection with receive and
//!   overall timeouts
//! - **Rich output**: images and PDFs saved to a per-document cache
//!
//! ## Quick Start
//!
//! ```no_run
//! use qkernel::execution::{ExecuteOptions, ExecutionEngine};
//! use qkernel::session::{FileSessionStore, JupyterProvisioner, SessionSupervisor};
//! use qkernel::transport::KernelClient;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> qkernel::Result<()> {
//!     qkernel::logging::try_init().ok();
//!
//!     let supervisor = SessionSupervisor::new(
//!         FileSessionStore::new("/tmp/qkernel"),
//!         JupyterProvisioner::new("/tmp/qkernel/runtime"),
//!     );
//!     let record = supervisor.start("python3").await?;
//!
//!     let mut client = KernelClient::connect(&record, Duration::from_secs(30)).await?;
//!     let result = ExecutionEngine::new(ExecuteOptions::default())
//!         .execute(&mut client, "print(40 + 2)")
//!         .await?;
//!     assert_eq!(result.stdout, "42\n");
//!
//!     client.disconnect();
//!     supervisor.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod document;
pub mod error;
pub mod execution;
pub mod logging;
pub mod output;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use error::{QkernelError, Result};
pub use execution::{ExecuteOptions, ExecutionEngine, ExecutionFailure, ExecutionResult};
pub use session::{FileSessionStore, SessionRecord, SessionStore, SessionSupervisor};
pub use transport::{KernelChannel, KernelClient};
