//! Deterministic signing keys for tests.

use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};

/// An Ed25519 key derived from a one-byte seed.
///
/// The same seed always yields the same key, so fixtures can be compared
/// across runs.
#[derive(Debug, Clone)]
pub struct TestSigner {
    name: String,
    key: SigningKey,
}

impl TestSigner {
    pub fn new(name: &str, seed: u8) -> Self {
        Self {
            name: name.to_string(),
            key: SigningKey::from_bytes(&[seed; 32]),
        }
    }

    /// Display name to configure for this key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 64 hex digits, the form the settings file takes.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().as_bytes())
    }

    /// First 16 hex digits of the SHA-256 of the public key.
    pub fn key_id(&self) -> String {
        let digest = Sha256::digest(self.key.verifying_key().as_bytes());
        hex::encode(digest)[..16].to_string()
    }

    /// One sidecar line: `<key-id> <hex-signature>`.
    pub fn sidecar(&self, data: &[u8]) -> String {
        let signature = self.key.sign(data);
        format!("{} {}\n", self.key_id(), hex::encode(signature.to_bytes()))
    }

    /// A sidecar line with this key id whose signature is over other data.
    pub fn forged_sidecar(&self, data: &[u8]) -> String {
        let mut tampered = data.to_vec();
        tampered.push(b'!');
        self.sidecar(&tampered)
    }
}
