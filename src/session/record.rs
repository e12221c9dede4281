//! The persisted description of the one running kernel.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::probe;

/// Everything needed to find and attach to a running kernel again.
///
/// Serialized as a flat JSON object with exactly these three keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionRecord {
    /// Path of the kernel's connection file.
    pub connection_file: PathBuf,
    /// Kernelspec name the kernel was started from.
    pub kernel_name: String,
    /// Process id of the kernel.
    pub pid: u32,
}

/// Why a stored record no longer describes a usable kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// The recorded process does not exist.
    ProcessGone,
    /// The connection file was removed.
    ConnectionMissing,
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProcessGone => write!(f, "kernel process is gone"),
            Self::ConnectionMissing => write!(f, "connection file is missing"),
        }
    }
}

impl SessionRecord {
    /// Create a new record.
    pub fn new(connection_file: impl Into<PathBuf>, kernel_name: impl Into<String>, pid: u32) -> Self {
        Self {
            connection_file: connection_file.into(),
            kernel_name: kernel_name.into(),
            pid,
        }
    }

    /// Probe the process and connection file.
    ///
    /// Returns `None` when the record is still live.
    pub fn staleness(&self) -> Option<Staleness> {
        if !probe::process_alive(self.pid) {
            return Some(Staleness::ProcessGone);
        }
        if !self.connection_file.exists() {
            return Some(Staleness::ConnectionMissing);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_serialized_shape() {
        let record = SessionRecord::new("/tmp/kernel-1.json", "python3", 1234);
        let value = serde_json::to_value(&record).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), 3);
        assert_eq!(object["connection_file"], "/tmp/kernel-1.json");
        assert_eq!(object["kernel_name"], "python3");
        assert_eq!(object["pid"], 1234);
    }

    #[test]
    fn test_rejects_missing_and_extra_keys() {
        assert!(serde_json::from_str::<SessionRecord>(r#"{"pid": 1}"#).is_err());
        assert!(serde_json::from_str::<SessionRecord>(
            r#"{"connection_file": "a", "kernel_name": "ir", "pid": 1, "extra": true}"#
        )
        .is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_live_record() {
        let file = NamedTempFile::new().unwrap();
        let record = SessionRecord::new(file.path(), "python3", std::process::id());
        assert_eq!(record.staleness(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_connection_file() {
        let record = SessionRecord::new("/nonexistent/kernel-x.json", "python3", std::process::id());
        assert_eq!(record.staleness(), Some(Staleness::ConnectionMissing));
    }

    #[cfg(unix)]
    #[test]
    fn test_dead_process() {
        let file = NamedTempFile::new().unwrap();
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        let record = SessionRecord::new(file.path(), "python3", pid);
        assert_eq!(record.staleness(), Some(Staleness::ProcessGone));
    }
}
