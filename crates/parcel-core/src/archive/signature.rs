//! Detached signature verification.
//!
//! A sidecar `<file>.sig` holds one signature per line:
//!
//! ```text
//! 3f2a9c01d4e5b6a7 8e4f...c1 (64 bytes as hex)
//! ```
//!
//! The first field is the key id: the first 16 hex digits of the SHA-256 of
//! the 32-byte Ed25519 public key. Blank lines and `#` comments are ignored.
//!
//! OpenPGP sidecars, as published by the GNU archives, are recognized but
//! not checked; they are reported as [`SignatureError::Unsupported`].

use std::collections::BTreeMap;

use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::SignatureError;

/// What to do about artifacts and indexes without a good signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignaturePolicy {
    /// Every file must carry at least one good signature.
    Required,
    /// Missing signatures and unknown keys only warn.
    #[default]
    AllowUnsigned,
    /// Never check.
    Off,
}

/// A signature that verified against a known key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoodSignature {
    pub key_id: String,
    pub signer: String,
}

impl std::fmt::Display for GoodSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.key_id, self.signer)
    }
}

/// Outcome for one signature in a sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    Good(GoodSignature),
    UnknownKey { key_id: String },
    Bad { key_id: String },
}

/// Checks detached signatures.
pub trait SignatureVerifier: Send + Sync {
    /// Status of every signature in `signature` over `data`.
    ///
    /// Fails only when the sidecar itself cannot be read.
    fn verify(&self, file: &str, data: &[u8], signature: &[u8]) -> Result<Vec<SignatureStatus>, SignatureError>;
}

/// Key id for an Ed25519 public key.
pub fn key_id(key: &VerifyingKey) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Trusted Ed25519 public keys.
#[derive(Debug, Clone, Default)]
pub struct Ed25519Keyring {
    keys: BTreeMap<String, (String, VerifyingKey)>,
}

impl Ed25519Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust `key` under the display name `signer`; returns its key id.
    pub fn add_key(&mut self, signer: impl Into<String>, key: VerifyingKey) -> String {
        let id = key_id(&key);
        self.keys.insert(id.clone(), (signer.into(), key));
        id
    }

    /// Trust a key given as 64 hex digits.
    pub fn add_hex(&mut self, signer: impl Into<String>, public_key: &str) -> Result<String, SignatureError> {
        let malformed = |reason: String| SignatureError::Malformed {
            file: "keyring".into(),
            reason,
        };
        let bytes = hex::decode(public_key.trim()).map_err(|e| malformed(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| malformed("public key must be 32 bytes".into()))?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|e| malformed(e.to_string()))?;
        Ok(self.add_key(signer, key))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

const PGP_ARMOR: &[u8] = b"-----BEGIN PGP SIGNATURE-----";

/// Name of a signature format other than ours, if `signature` is one.
fn foreign_format(signature: &[u8]) -> Option<&'static str> {
    let start = signature.trim_ascii_start();
    if start.starts_with(PGP_ARMOR) {
        Some("an armored OpenPGP signature")
    } else if start.first().is_some_and(|b| b & 0x80 != 0) {
        // OpenPGP packets always set the top bit of the tag byte
        Some("a binary OpenPGP signature")
    } else {
        None
    }
}

impl SignatureVerifier for Ed25519Keyring {
    fn verify(&self, file: &str, data: &[u8], signature: &[u8]) -> Result<Vec<SignatureStatus>, SignatureError> {
        let malformed = |reason: String| SignatureError::Malformed {
            file: file.to_string(),
            reason,
        };
        if let Some(format) = foreign_format(signature) {
            return Err(SignatureError::Unsupported {
                file: file.to_string(),
                format: format.to_string(),
            });
        }
        let text = std::str::from_utf8(signature).map_err(|_| malformed("not UTF-8".into()))?;

        let mut statuses = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (Some(id), Some(sig_hex), None) = (fields.next(), fields.next(), fields.next()) else {
                return Err(malformed(format!("line {}: expected '<key-id> <signature>'", lineno + 1)));
            };
            let sig_bytes = hex::decode(sig_hex).map_err(|e| malformed(format!("line {}: {e}", lineno + 1)))?;
            let sig = Signature::from_slice(&sig_bytes)
                .map_err(|e| malformed(format!("line {}: {e}", lineno + 1)))?;

            let status = match self.keys.get(id) {
                None => SignatureStatus::UnknownKey { key_id: id.to_string() },
                Some((signer, key)) => match key.verify_strict(data, &sig) {
                    Ok(()) => SignatureStatus::Good(GoodSignature {
                        key_id: id.to_string(),
                        signer: signer.clone(),
                    }),
                    Err(_) => SignatureStatus::Bad { key_id: id.to_string() },
                },
            };
            statuses.push(status);
        }

        if statuses.is_empty() {
            return Err(malformed("no signatures".into()));
        }
        Ok(statuses)
    }
}

/// Reduce per-signature statuses to the good ones, or the most serious failure.
///
/// A bad signature outranks an unknown key, so a file that fails only for
/// lack of keys can be told apart from a tampered one.
pub fn summarize(file: &str, statuses: Vec<SignatureStatus>) -> Result<Vec<GoodSignature>, SignatureError> {
    let mut good = Vec::new();
    let mut bad = None;
    let mut unknown = None;
    for status in statuses {
        match status {
            SignatureStatus::Good(sig) => good.push(sig),
            SignatureStatus::Bad { key_id } => {
                bad.get_or_insert(key_id);
            }
            SignatureStatus::UnknownKey { key_id } => {
                unknown.get_or_insert(key_id);
            }
        }
    }

    if !good.is_empty() {
        return Ok(good);
    }
    let file = file.to_string();
    Err(match (bad, unknown) {
        (Some(key_id), _) => SignatureError::Bad { file, key_id },
        (None, Some(key_id)) => SignatureError::UnknownKey { file, key_id },
        (None, None) => SignatureError::NoGood { file },
    })
}
