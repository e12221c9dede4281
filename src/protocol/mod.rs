//! Kernel messaging protocol.
//!
//! Messages travel as multipart ZeroMQ frames:
//!
//! ```text
//! [identities/topic...] <IDS|MSG> signature header parent_header metadata content [buffers...]
//! ```
//!
//! The signature is a hex HMAC-SHA256 over the four JSON frames, keyed by
//! the connection file's `key`.

mod message;
mod mime;
mod notification;
mod signer;

pub use message::{execute_request_content, Header, JupyterMessage, DELIMITER, PROTOCOL_VERSION};
pub use mime::{MimeBundle, MimePayload, MimeType};
pub use notification::{KernelStatus, Notification, NotificationKind, StreamName};
pub use signer::{Signer, SIGNATURE_SCHEME};
