//! JSON envelope for signed worker messages.

use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::sign;

/// A payload plus an ed25519 signature over its JSON encoding.
///
/// Verification re-encodes the payload, so sender and receiver must agree
/// on the JSON encoding of `T`; both sides of this protocol derive it from
/// the same struct definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedMessage<T> {
    /// Base64-encoded signature.
    pub signature: String,
    pub content: T,
}

impl<T: Serialize> SignedMessage<T> {
    pub fn sign(key: &SigningKey, content: T) -> serde_json::Result<Self> {
        let bytes = serde_json::to_vec(&content)?;
        Ok(Self {
            signature: sign::sign(key, &bytes),
            content,
        })
    }

    /// Verify the signature and unwrap the payload.
    pub fn verify_into(self, key: &VerifyingKey) -> Option<T> {
        let bytes = serde_json::to_vec(&self.content).ok()?;
        sign::verify(key, &bytes, &self.signature).then_some(self.content)
    }
}
