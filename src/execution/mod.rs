//! Code execution against a kernel.
//!
//! [`ExecutionEngine`] submits one piece of code over a
//! [`KernelChannel`](crate::transport::KernelChannel) and folds the
//! notifications carrying that request's correlation token into an
//! [`ExecutionResult`], until the kernel reports idle or time runs out.
//! [`run_batch`] drives a sequence of cells through it, starting a
//! temporary kernel when none is running.
//!
//! # Example
//!
//! ```no_run
//! use qkernel::execution::{ExecuteOptions, ExecutionEngine};
//! use qkernel::session::FileSessionStore;
//! use qkernel::transport::KernelClient;
//! use std::time::Duration;
//!
//! # async fn demo() -> qkernel::Result<()> {
//! let store = FileSessionStore::new("/tmp/qkernel-state");
//! let mut client = KernelClient::connect_current(&store, Duration::from_secs(30)).await?;
//! let engine = ExecutionEngine::new(ExecuteOptions::default());
//! let result = engine.execute(&mut client, "print(40 + 2)").await?;
//! println!("{}", result.stdout);
//! # Ok(())
//! # }
//! ```

mod batch;
mod engine;
mod result;

pub use batch::{run_batch, BatchOptions, BatchOutcome, ResultSink};
pub use engine::{ExecuteOptions, ExecutionEngine, DEFAULT_RECEIVE_TIMEOUT};
pub use result::{ExecutionFailure, ExecutionPhase, ExecutionResult};
