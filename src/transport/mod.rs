//! Transport to a running kernel.
//!
//! [`KernelClient`] speaks the messaging protocol over ZeroMQ using the
//! ports and key in the kernel's connection file. The execution engine
//! only sees the [`KernelChannel`] trait.

mod channel;
mod client;
mod connection;

pub use channel::{KernelChannel, KernelConnector};
pub use client::{KernelClient, ZmqConnector};
pub use connection::ConnectionInfo;
