//! Typed view of IOPub messages.

use serde_json::Value;

use super::{JupyterMessage, MimeBundle};

/// Which standard stream a fragment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamName {
    Stdout,
    Stderr,
}

/// Kernel execution state reported by `status` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelStatus {
    Starting,
    Busy,
    Idle,
    Unknown,
}

impl KernelStatus {
    fn parse(state: &str) -> Self {
        match state {
            "starting" => Self::Starting,
            "busy" => Self::Busy,
            "idle" => Self::Idle,
            _ => Self::Unknown,
        }
    }
}

/// What a notification carries.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationKind {
    /// Text written to stdout or stderr.
    Stream { name: StreamName, text: String },
    /// The value of the last expression (`execute_result`).
    ExecuteResult { data: MimeBundle },
    /// Rich output shown during execution (`display_data`).
    DisplayData { data: MimeBundle },
    /// The code raised (`error`).
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
    /// Kernel execution state changed.
    Status(KernelStatus),
    /// Any other message type, kept by name only.
    Other(String),
}

/// One asynchronous message from the kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Id of the request that caused this notification.
    pub parent_id: Option<String>,
    pub kind: NotificationKind,
}

impl Notification {
    /// Create a notification caused by request `parent_id`.
    pub fn new(parent_id: impl Into<String>, kind: NotificationKind) -> Self {
        Self {
            parent_id: Some(parent_id.into()),
            kind,
        }
    }

    /// Whether this notification answers request `token`.
    pub fn belongs_to(&self, token: &str) -> bool {
        self.parent_id.as_deref() == Some(token)
    }
}

fn str_field(content: &Value, key: &str) -> String {
    content
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl From<&JupyterMessage> for NotificationKind {
    fn from(msg: &JupyterMessage) -> Self {
        let content = &msg.content;
        match msg.msg_type() {
            "stream" => {
                let name = match content.get("name").and_then(Value::as_str) {
                    Some("stderr") => StreamName::Stderr,
                    Some("stdout") => StreamName::Stdout,
                    other => return Self::Other(format!("stream:{}", other.unwrap_or("?"))),
                };
                Self::Stream {
                    name,
                    text: str_field(content, "text"),
                }
            }
            "execute_result" => Self::ExecuteResult {
                data: MimeBundle::from_json(content.get("data").unwrap_or(&Value::Null)),
            },
            "display_data" => Self::DisplayData {
                data: MimeBundle::from_json(content.get("data").unwrap_or(&Value::Null)),
            },
            "error" => Self::Error {
                ename: str_field(content, "ename"),
                evalue: str_field(content, "evalue"),
                traceback: content
                    .get("traceback")
                    .and_then(Value::as_array)
                    .map(|lines| {
                        lines
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            "status" => Self::Status(KernelStatus::parse(
                content
                    .get("execution_state")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
            )),
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<JupyterMessage> for Notification {
    fn from(msg: JupyterMessage) -> Self {
        Self {
            kind: NotificationKind::from(&msg),
            parent_id: msg.parent_id().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Header;
    use serde_json::json;

    fn child(msg_type: &str, content: Value) -> (Header, Notification) {
        let parent = Header::new("execute_request", "client");
        let msg = JupyterMessage::new(msg_type, content, "kernel").with_parent(&parent);
        (parent, Notification::from(msg))
    }

    #[test]
    fn test_stream() {
        let (parent, n) = child("stream", json!({"name": "stderr", "text": "warn\n"}));
        assert!(n.belongs_to(&parent.msg_id));
        assert_eq!(
            n.kind,
            NotificationKind::Stream {
                name: StreamName::Stderr,
                text: "warn\n".into()
            }
        );
    }

    #[test]
    fn test_error() {
        let (_, n) = child(
            "error",
            json!({"ename": "NameError", "evalue": "name 'x' is not defined", "traceback": ["a", "b"]}),
        );
        match n.kind {
            NotificationKind::Error {
                ename,
                evalue,
                traceback,
            } => {
                assert_eq!(ename, "NameError");
                assert!(evalue.contains("'x'"));
                assert_eq!(traceback, vec!["a", "b"]);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_status_and_other() {
        let (_, idle) = child("status", json!({"execution_state": "idle"}));
        assert_eq!(idle.kind, NotificationKind::Status(KernelStatus::Idle));

        let (_, weird) = child("status", json!({}));
        assert_eq!(weird.kind, NotificationKind::Status(KernelStatus::Unknown));

        let (_, input) = child("execute_input", json!({"code": "1"}));
        assert_eq!(input.kind, NotificationKind::Other("execute_input".into()));
    }

    #[test]
    fn test_unparented() {
        let n = Notification::from(JupyterMessage::new("status", json!({"execution_state": "starting"}), "k"));
        assert!(n.parent_id.is_none());
        assert!(!n.belongs_to(""));
    }

    #[test]
    fn test_execute_result_data() {
        let (_, n) = child("execute_result", json!({"data": {"text/plain": "42"}, "execution_count": 1}));
        match n.kind {
            NotificationKind::ExecuteResult { data } => assert_eq!(data.plain_text(), Some("42")),
            other => panic!("unexpected kind: {other:?}"),
        }
    }
}
