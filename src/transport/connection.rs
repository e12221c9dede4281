//! Connection files.

use std::fs;
use std::io::Write;
use std::net::{Ipv4Addr, TcpListener};
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::SIGNATURE_SCHEME;
use crate::Result;

/// Contents of a kernel connection file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub shell_port: u16,
    pub iopub_port: u16,
    pub stdin_port: u16,
    pub control_port: u16,
    pub hb_port: u16,
    pub ip: String,
    pub key: String,
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default = "default_signature_scheme")]
    pub signature_scheme: String,
    #[serde(default)]
    pub kernel_name: String,
}

fn default_transport() -> String {
    "tcp".to_string()
}

fn default_signature_scheme() -> String {
    SIGNATURE_SCHEME.to_string()
}

impl ConnectionInfo {
    /// Pick five free loopback ports and a fresh key.
    ///
    /// All listeners are held until every port is chosen so the same port
    /// cannot be handed out twice.
    pub fn allocate(kernel_name: &str) -> Result<Self> {
        let listeners = (0..5)
            .map(|_| TcpListener::bind((Ipv4Addr::LOCALHOST, 0)))
            .collect::<std::io::Result<Vec<_>>>()?;
        let ports = listeners
            .iter()
            .map(|l| l.local_addr().map(|a| a.port()))
            .collect::<std::io::Result<Vec<_>>>()?;
        drop(listeners);

        Ok(Self {
            shell_port: ports[0],
            iopub_port: ports[1],
            stdin_port: ports[2],
            control_port: ports[3],
            hb_port: ports[4],
            ip: Ipv4Addr::LOCALHOST.to_string(),
            key: Uuid::new_v4().to_string(),
            transport: default_transport(),
            signature_scheme: default_signature_scheme(),
            kernel_name: kernel_name.to_string(),
        })
    }

    /// Read a connection file.
    pub fn read_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write a connection file readable only by the owner.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            // Holds the signing key; private from creation.
            options.mode(0o600);
        }

        let mut file = options.open(path)?;
        file.write_all(&serde_json::to_vec_pretty(self)?)?;

        #[cfg(unix)]
        {
            // `mode` only applies to new files.
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// ZeroMQ endpoint for a port.
    pub fn endpoint(&self, port: u16) -> String {
        match self.transport.as_str() {
            "ipc" => format!("ipc://{}-{}", self.ip, port),
            transport => format!("{}://{}:{}", transport, self.ip, port),
        }
    }

    pub fn shell_endpoint(&self) -> String {
        self.endpoint(self.shell_port)
    }

    pub fn iopub_endpoint(&self) -> String {
        self.endpoint(self.iopub_port)
    }

    pub fn control_endpoint(&self) -> String {
        self.endpoint(self.control_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    #[test]
    fn test_allocate_distinct_ports() {
        let info = ConnectionInfo::allocate("python3").unwrap();
        let ports: HashSet<u16> = [
            info.shell_port,
            info.iopub_port,
            info.stdin_port,
            info.control_port,
            info.hb_port,
        ]
        .into_iter()
        .collect();

        assert_eq!(ports.len(), 5);
        assert!(!ports.contains(&0));
        assert_eq!(info.ip, "127.0.0.1");
        assert_eq!(info.signature_scheme, "hmac-sha256");
        assert!(!info.key.is_empty());
    }

    #[test]
    fn test_write_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runtime").join("kernel-1.json");
        let info = ConnectionInfo::allocate("ir").unwrap();

        info.write_to(&path).unwrap();
        assert_eq!(ConnectionInfo::read_from(&path).unwrap(), info);
    }

    #[cfg(unix)]
    #[test]
    fn test_connection_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("kernel-2.json");
        // A pre-existing world-readable file is tightened too.
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        ConnectionInfo::allocate("python3").unwrap().write_to(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let fresh = dir.path().join("kernel-3.json");
        ConnectionInfo::allocate("python3").unwrap().write_to(&fresh).unwrap();
        let mode = fs::metadata(&fresh).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_parse_minimal_file() {
        let info: ConnectionInfo = serde_json::from_str(
            r#"{"shell_port": 1, "iopub_port": 2, "stdin_port": 3, "control_port": 4,
                "hb_port": 5, "ip": "127.0.0.1", "key": "k"}"#,
        )
        .unwrap();

        assert_eq!(info.transport, "tcp");
        assert_eq!(info.shell_endpoint(), "tcp://127.0.0.1:1");
        assert_eq!(info.iopub_endpoint(), "tcp://127.0.0.1:2");
        assert_eq!(info.control_endpoint(), "tcp://127.0.0.1:4");
    }

    #[test]
    fn test_ipc_endpoint() {
        let mut info = ConnectionInfo::allocate("python3").unwrap();
        info.transport = "ipc".into();
        info.ip = "/tmp/kernel".into();
        assert_eq!(info.endpoint(7), "ipc:///tmp/kernel-7");
    }
}
