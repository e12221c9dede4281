//! Wire messages and their multipart frame encoding.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::Signer;
use crate::error::QkernelError;
use crate::Result;

/// Delimiter between routing identities and the message body.
pub const DELIMITER: &[u8] = b"<IDS|MSG>";

/// Messaging protocol version spoken by this client.
pub const PROTOCOL_VERSION: &str = "5.3";

/// Message header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Unique id; echoed as the parent of every message it causes.
    pub msg_id: String,
    /// Client session id.
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub username: String,
    /// ISO 8601 timestamp.
    #[serde(default)]
    pub date: String,
    pub msg_type: String,
    #[serde(default)]
    pub version: String,
}

impl Header {
    /// Create a header with a fresh message id.
    pub fn new(msg_type: impl Into<String>, session: &str) -> Self {
        Self {
            msg_id: Uuid::new_v4().to_string(),
            session: session.to_string(),
            username: username(),
            date: chrono::Utc::now().to_rfc3339(),
            msg_type: msg_type.into(),
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}

fn username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "qkernel".to_string())
}

/// A decoded message.
#[derive(Debug, Clone, PartialEq)]
pub struct JupyterMessage {
    pub header: Header,
    /// Header of the request that caused this message, if any.
    pub parent_header: Option<Header>,
    pub metadata: Value,
    pub content: Value,
}

impl JupyterMessage {
    /// Create a request message.
    pub fn new(msg_type: &str, content: Value, session: &str) -> Self {
        Self {
            header: Header::new(msg_type, session),
            parent_header: None,
            metadata: Value::Object(Map::new()),
            content,
        }
    }

    /// Make this message a reply/notification caused by `parent`.
    pub fn with_parent(mut self, parent: &Header) -> Self {
        self.parent_header = Some(parent.clone());
        self
    }

    /// Message id.
    pub fn id(&self) -> &str {
        &self.header.msg_id
    }

    /// Message type.
    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }

    /// The id of the causing request, if any.
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_header.as_ref().map(|h| h.msg_id.as_str())
    }

    /// Whether this message was caused by request `msg_id`.
    pub fn is_child_of(&self, msg_id: &str) -> bool {
        self.parent_id() == Some(msg_id)
    }

    /// Encode into signed frames, starting at the delimiter.
    pub fn to_frames(&self, signer: &Signer) -> Result<Vec<Bytes>> {
        let header = serde_json::to_vec(&self.header)?;
        let parent = match &self.parent_header {
            Some(parent) => serde_json::to_vec(parent)?,
            None => b"{}".to_vec(),
        };
        let metadata = serde_json::to_vec(&self.metadata)?;
        let content = serde_json::to_vec(&self.content)?;

        let signature = signer.sign(&[
            header.as_slice(),
            parent.as_slice(),
            metadata.as_slice(),
            content.as_slice(),
        ]);

        Ok(vec![
            Bytes::from_static(DELIMITER),
            Bytes::from(signature),
            Bytes::from(header),
            Bytes::from(parent),
            Bytes::from(metadata),
            Bytes::from(content),
        ])
    }

    /// Decode frames as received from a socket.
    ///
    /// Routing identities or a subscription topic before the delimiter are
    /// skipped. Trailing binary buffers are ignored.
    pub fn from_frames(frames: &[Bytes], signer: &Signer) -> Result<Self> {
        let start = frames
            .iter()
            .position(|f| f.as_ref() == DELIMITER)
            .ok_or_else(|| QkernelError::Protocol("missing <IDS|MSG> delimiter".into()))?;

        let body = &frames[start + 1..];
        if body.len() < 5 {
            return Err(QkernelError::Protocol(format!(
                "expected at least 5 frames after delimiter, got {}",
                body.len()
            )));
        }

        let (signature, header, parent, metadata, content) =
            (&body[0], &body[1], &body[2], &body[3], &body[4]);

        let parts: [&[u8]; 4] = [header.as_ref(), parent.as_ref(), metadata.as_ref(), content.as_ref()];
        if !signer.verify(signature.as_ref(), &parts) {
            return Err(QkernelError::Protocol("invalid message signature".into()));
        }

        let header: Header = serde_json::from_slice(header)?;
        let parent_value: Value = serde_json::from_slice(parent)?;
        let parent_header = match parent_value {
            Value::Object(ref map) if map.is_empty() => None,
            Value::Null => None,
            other => Some(serde_json::from_value(other)?),
        };

        Ok(Self {
            header,
            parent_header,
            metadata: serde_json::from_slice(metadata)?,
            content: serde_json::from_slice(content)?,
        })
    }
}

/// Content of an `execute_request`.
pub fn execute_request_content(code: &str) -> Value {
    json!({
        "code": code,
        "silent": false,
        "store_history": true,
        "user_expressions": {},
        "allow_stdin": false,
        "stop_on_error": true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_roundtrip_with_identity_prefix() {
        let signer = Signer::new("key");
        let request = JupyterMessage::new("execute_request", execute_request_content("1+1"), "sess");
        let reply = JupyterMessage::new("execute_reply", json!({"status": "ok"}), "kernel")
            .with_parent(&request.header);

        let mut frames = vec![Bytes::from_static(b"kernel.abc.execute_reply")];
        frames.extend(reply.to_frames(&signer).unwrap());

        let decoded = JupyterMessage::from_frames(&frames, &signer).unwrap();
        assert_eq!(decoded, reply);
        assert!(decoded.is_child_of(request.id()));
    }

    #[test]
    fn test_empty_parent_is_none() {
        let signer = Signer::new("");
        let msg = JupyterMessage::new("status", json!({"execution_state": "starting"}), "k");
        let frames = msg.to_frames(&signer).unwrap();

        assert_eq!(frames[3].as_ref(), b"{}");
        let decoded = JupyterMessage::from_frames(&frames, &signer).unwrap();
        assert!(decoded.parent_header.is_none());
        assert_eq!(decoded.parent_id(), None);
    }

    #[test]
    fn test_bad_signature_rejected() {
        let msg = JupyterMessage::new("status", json!({}), "k");
        let frames = msg.to_frames(&Signer::new("one")).unwrap();
        let err = JupyterMessage::from_frames(&frames, &Signer::new("two")).unwrap_err();
        assert!(err.to_string().contains("signature"));
    }

    #[test]
    fn test_missing_delimiter() {
        let frames = vec![Bytes::from_static(b"{}")];
        assert!(JupyterMessage::from_frames(&frames, &Signer::new("")).is_err());
    }

    #[test]
    fn test_truncated_body() {
        let frames = vec![Bytes::from_static(DELIMITER), Bytes::new(), Bytes::from_static(b"{}")];
        assert!(JupyterMessage::from_frames(&frames, &Signer::new("")).is_err());
    }

    #[test]
    fn test_header_defaults() {
        let header: Header =
            serde_json::from_str(r#"{"msg_id": "m1", "msg_type": "status"}"#).unwrap();
        assert_eq!(header.msg_id, "m1");
        assert!(header.session.is_empty());
    }

    #[test]
    fn test_new_headers_are_unique() {
        let a = Header::new("kernel_info_request", "s");
        let b = Header::new("kernel_info_request", "s");
        assert_ne!(a.msg_id, b.msg_id);
        assert_eq!(a.version, PROTOCOL_VERSION);
    }
}
