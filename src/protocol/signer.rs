//! HMAC signing of wire messages.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// The only signature scheme kernels are started with.
pub const SIGNATURE_SCHEME: &str = "hmac-sha256";

/// Signs and verifies the four JSON frames of a message.
///
/// An empty key disables authentication: signatures are empty and every
/// message verifies.
#[derive(Clone)]
pub struct Signer {
    key: Option<Vec<u8>>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("enabled", &self.key.is_some())
            .finish()
    }
}

impl Signer {
    /// Create a signer from the connection key.
    pub fn new(key: &str) -> Self {
        Self {
            key: (!key.is_empty()).then(|| key.as_bytes().to_vec()),
        }
    }

    fn mac(&self, parts: &[&[u8]]) -> Option<HmacSha256> {
        let key = self.key.as_ref()?;
        // HMAC accepts keys of any length.
        let mut mac = HmacSha256::new_from_slice(key).ok()?;
        for part in parts {
            mac.update(part);
        }
        Some(mac)
    }

    /// Hex signature over `parts`, or an empty string when unsigned.
    pub fn sign(&self, parts: &[&[u8]]) -> String {
        self.mac(parts)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default()
    }

    /// Constant-time check of a hex signature.
    pub fn verify(&self, signature: &[u8], parts: &[&[u8]]) -> bool {
        let Some(mac) = self.mac(parts) else {
            return true;
        };
        match hex::decode(signature) {
            Ok(raw) => mac.verify_slice(&raw).is_ok(),
            Err(_) => false,
        }
    }
}
