//! ZeroMQ client for a running kernel.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use zeromq::{DealerSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use super::{ConnectionInfo, KernelChannel, KernelConnector};
use crate::error::QkernelError;
use crate::protocol::{execute_request_content, JupyterMessage, Notification, Signer};
use crate::session::probe::deadline_after;
use crate::session::{SessionRecord, SessionStore};
use crate::Result;

/// How long one readiness probe waits before sending another.
const READY_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Delay between attempts to reach sockets that are not listening yet.
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

async fn send_message<S: SocketSend + Send>(
    socket: &mut S,
    signer: &Signer,
    msg: &JupyterMessage,
) -> Result<()> {
    let frames = msg.to_frames(signer)?;
    let zmsg = ZmqMessage::try_from(frames).map_err(|e| QkernelError::Transport(e.to_string()))?;
    socket.send(zmsg).await?;
    Ok(())
}

/// Receive the next well-formed message, dropping undecodable ones.
async fn recv_message<S: SocketRecv + Send>(
    socket: &mut S,
    signer: &Signer,
) -> Result<JupyterMessage> {
    loop {
        let frames = socket.recv().await?.into_vec();
        match JupyterMessage::from_frames(&frames, signer) {
            Ok(msg) => return Ok(msg),
            Err(e @ (QkernelError::Protocol(_) | QkernelError::Json(_))) => {
                warn!(error = %e, "dropping undecodable kernel message");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Wait for the reply to request `token`, discarding unrelated replies.
async fn recv_reply<S: SocketRecv + Send>(
    socket: &mut S,
    signer: &Signer,
    token: &str,
) -> Result<JupyterMessage> {
    loop {
        let msg = recv_message(socket, signer).await?;
        if msg.is_child_of(token) && msg.msg_type().ends_with("_reply") {
            return Ok(msg);
        }
        debug!(msg_type = msg.msg_type(), "discarding unrelated reply");
    }
}

/// Client connection to a kernel's shell, control and IOPub channels.
pub struct KernelClient {
    info: ConnectionInfo,
    signer: Signer,
    session: String,
    shell: DealerSocket,
    control: DealerSocket,
    iopub: SubSocket,
}

impl std::fmt::Debug for KernelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelClient")
            .field("shell", &self.info.shell_endpoint())
            .field("session", &self.session)
            .finish()
    }
}

impl KernelClient {
    /// Connect the sockets once, without waiting for readiness.
    async fn try_open(info: &ConnectionInfo) -> Result<Self> {
        let mut shell = DealerSocket::new();
        shell.connect(&info.shell_endpoint()).await?;

        let mut control = DealerSocket::new();
        control.connect(&info.control_endpoint()).await?;

        let mut iopub = SubSocket::new();
        iopub.subscribe("").await?;
        iopub.connect(&info.iopub_endpoint()).await?;

        Ok(Self {
            signer: Signer::new(&info.key),
            session: uuid::Uuid::new_v4().to_string(),
            info: info.clone(),
            shell,
            control,
            iopub,
        })
    }

    /// Connect the sockets, retrying while the kernel is still binding them.
    ///
    /// Unbounded; callers apply a deadline.
    pub async fn open(info: ConnectionInfo) -> Result<Self> {
        loop {
            match Self::try_open(&info).await {
                Ok(client) => return Ok(client),
                Err(QkernelError::Transport(e)) => {
                    debug!(error = %e, "kernel sockets not reachable yet");
                    tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Attach to the kernel described by `record` and wait until it is ready.
    pub async fn connect(record: &SessionRecord, ready_timeout: Duration) -> Result<Self> {
        let info = ConnectionInfo::read_from(&record.connection_file)?;
        let deadline = deadline_after(ready_timeout);

        let mut client = tokio::time::timeout_at(deadline, Self::open(info))
            .await
            .map_err(|_| QkernelError::ConnectTimeout(ready_timeout))??;

        client.wait_until(deadline, ready_timeout).await?;
        info!(pid = record.pid, kernel = %record.kernel_name, "connected to kernel");
        Ok(client)
    }

    /// Attach to the kernel recorded in `store`.
    pub async fn connect_current<S: SessionStore + ?Sized>(
        store: &S,
        ready_timeout: Duration,
    ) -> Result<Self> {
        let record = store.load()?.ok_or(QkernelError::NoSessionRunning)?;
        Self::connect(&record, ready_timeout).await
    }

    /// Block until the kernel answers on shell and publishes on IOPub.
    pub async fn wait_for_ready(&mut self, timeout: Duration) -> Result<()> {
        self.wait_until(deadline_after(timeout), timeout).await
    }

    async fn wait_until(&mut self, deadline: Instant, timeout: Duration) -> Result<()> {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(QkernelError::ConnectTimeout(timeout));
            }

            let request = JupyterMessage::new("kernel_info_request", json!({}), &self.session);
            let token = request.id().to_string();
            send_message(&mut self.shell, &self.signer, &request).await?;

            let probe_end = deadline.min(now + READY_PROBE_INTERVAL);
            match tokio::time::timeout_at(probe_end, recv_reply(&mut self.shell, &self.signer, &token)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => continue,
            }

            // The reply alone does not prove our subscription is live; wait
            // for the status messages the request caused.
            let iopub_end = deadline.min(Instant::now() + READY_PROBE_INTERVAL);
            if let Ok(Ok(())) = tokio::time::timeout_at(iopub_end, self.await_iopub_child(&token)).await {
                debug!("kernel ready");
                return Ok(());
            }
        }
    }

    async fn await_iopub_child(&mut self, token: &str) -> Result<()> {
        loop {
            let msg = recv_message(&mut self.iopub, &self.signer).await?;
            if msg.is_child_of(token) {
                return Ok(());
            }
        }
    }

    /// Discard replies already queued on the shell socket.
    async fn drain_shell(&mut self) {
        while let Ok(Ok(msg)) = tokio::time::timeout(
            Duration::ZERO,
            recv_message(&mut self.shell, &self.signer),
        )
        .await
        {
            debug!(msg_type = msg.msg_type(), "drained shell reply");
        }
    }

    /// Ask the kernel to exit via the control channel.
    ///
    /// Succeeds once the kernel acknowledges with `shutdown_reply`.
    pub async fn request_shutdown(&mut self, timeout: Duration) -> Result<()> {
        let request = JupyterMessage::new("shutdown_request", json!({"restart": false}), &self.session);
        let token = request.id().to_string();
        send_message(&mut self.control, &self.signer, &request).await?;

        tokio::time::timeout(timeout, recv_reply(&mut self.control, &self.signer, &token))
            .await
            .map_err(|_| QkernelError::Transport(format!("no shutdown_reply within {timeout:?}")))??;
        Ok(())
    }

    /// Connection parameters in use.
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Close all sockets. The kernel keeps running.
    pub fn disconnect(self) {
        debug!(session = %self.session, "disconnecting from kernel");
    }
}

#[async_trait]
impl KernelChannel for KernelClient {
    async fn submit_execute(&mut self, code: &str) -> Result<String> {
        self.drain_shell().await;

        let request = JupyterMessage::new("execute_request", execute_request_content(code), &self.session);
        let token = request.id().to_string();
        send_message(&mut self.shell, &self.signer, &request).await?;
        debug!(%token, "execute_request sent");
        Ok(token)
    }

    async fn next_notification(&mut self) -> Result<Notification> {
        let msg = recv_message(&mut self.iopub, &self.signer).await?;
        Ok(Notification::from(msg))
    }

    fn disconnect(self: Box<Self>) {
        KernelClient::disconnect(*self);
    }
}

/// Opens [`KernelClient`] channels over ZeroMQ.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZmqConnector;

#[async_trait]
impl KernelConnector for ZmqConnector {
    async fn connect(
        &self,
        record: &SessionRecord,
        ready_timeout: Duration,
    ) -> Result<Box<dyn KernelChannel>> {
        let client = KernelClient::connect(record, ready_timeout).await?;
        Ok(Box::new(client))
    }
}
