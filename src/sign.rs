//! Ed25519 message signing for worker RPC.
//!
//! Run requests are signed with the pool's secret key and worker responses
//! are verified against the worker's public key. Signatures travel as
//! base64 text inside the JSON envelope.

use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::error::{FarmError, Result};

/// Sign a message, returning the base64-encoded signature.
pub fn sign(key: &SigningKey, message: &[u8]) -> String {
    let signature = key.sign(message);
    base64::engine::general_purpose::STANDARD.encode(signature.to_bytes())
}

/// Verify a base64-encoded signature over a message. Undecodable or
/// malformed signatures count as verification failures.
pub fn verify(key: &VerifyingKey, message: &[u8], signature_b64: &str) -> bool {
    let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(signature_b64) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&bytes) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

/// Construct a signing key from a base64-encoded 32-byte seed, as stored
/// in operator configuration.
pub fn signing_key_from_seed_base64(seed_b64: &str) -> Result<SigningKey> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(seed_b64)
        .map_err(|e| FarmError::InvalidSigningKey(format!("bad base64: {}", e)))?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|_| FarmError::InvalidSigningKey("seed must be 32 bytes".to_string()))?;
    Ok(SigningKey::from_bytes(&seed))
}

/// Public key as base64 text, the form used in the status JSON.
pub fn encode_public_key(key: &VerifyingKey) -> String {
    base64::engine::general_purpose::STANDARD.encode(key.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    #[test]
    fn sign_verify_round_trip() {
        let key = test_key();
        let sig = sign(&key, b"hello worker");
        assert!(verify(&key.verifying_key(), b"hello worker", &sig));
    }

    #[test]
    fn rejects_tampered_message() {
        let key = test_key();
        let sig = sign(&key, b"hello worker");
        assert!(!verify(&key.verifying_key(), b"hello w0rker", &sig));
    }

    #[test]
    fn rejects_wrong_key() {
        let key = test_key();
        let other = SigningKey::from_bytes(&[8u8; 32]);
        let sig = sign(&key, b"hello");
        assert!(!verify(&other.verifying_key(), b"hello", &sig));
    }

    #[test]
    fn rejects_garbage_signature() {
        let key = test_key();
        assert!(!verify(&key.verifying_key(), b"hello", "not base64!!"));
        assert!(!verify(&key.verifying_key(), b"hello", "aGVsbG8="));
    }

    #[test]
    fn seed_round_trip() {
        let seed_b64 = base64::engine::general_purpose::STANDARD.encode([3u8; 32]);
        let key = signing_key_from_seed_base64(&seed_b64).unwrap();
        assert_eq!(key.to_bytes(), [3u8; 32]);
    }

    #[test]
    fn bad_seed_errors() {
        assert!(signing_key_from_seed_base64("????").is_err());
        assert!(signing_key_from_seed_base64("c2hvcnQ=").is_err());
    }
}
