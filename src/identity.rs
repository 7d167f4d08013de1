//! src/identity.rs
//!
//! Cryptographic identity for a single participant: an Ed25519 keypair
//! persisted to (or loaded from) a key file, plus block-signing helpers.

use crate::error::{Error, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::{fmt, fs, io, path::Path};

/// A unique identifier for a participant, derived from its public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId([u8; 32]);

impl NodeId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node::{}", hex::encode(&self.0[..4]))
    }
}

/// The cryptographic identity of a single node.
#[derive(Debug, Clone)]
pub struct Identity {
    keypair: SigningKey,
    pub node_id: NodeId,
}

impl Identity {
    /// Generates a new, random identity.
    pub fn new() -> Self {
        let mut csprng = OsRng;
        let mut secret_key_bytes = [0u8; 32];
        csprng.fill_bytes(&mut secret_key_bytes);
        let keypair = SigningKey::from_bytes(&secret_key_bytes);
        let node_id = NodeId(keypair.verifying_key().to_bytes());
        Self { keypair, node_id }
    }

    /// Loads an identity from a file, or creates and persists a new one.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        match fs::read(path.as_ref()) {
            Ok(bytes) => {
                let keypair_bytes: [u8; 32] =
                    bytes.try_into().map_err(|_| Error::InvalidKeyFile)?;
                let keypair = SigningKey::from_bytes(&keypair_bytes);
                let node_id = NodeId(keypair.verifying_key().to_bytes());
                Ok(Self { keypair, node_id })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let identity = Self::new();
                fs::write(path.as_ref(), identity.keypair.to_bytes())?;
                Ok(identity)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Signs an arbitrary byte payload (used for block signatures).
    pub fn sign_bytes(&self, payload: &[u8]) -> Signature {
        self.keypair.sign(payload)
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.keypair.verifying_key()
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

/// Verifies a detached signature made with [`Identity::sign_bytes`].
pub fn verify_bytes(key: &NodeId, payload: &[u8], signature: &Signature) -> Result<()> {
    let public_key = VerifyingKey::from_bytes(key.as_bytes())?;
    public_key.verify(payload, signature)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sign_and_verify_round_trips() {
        let identity = Identity::new();
        let sig = identity.sign_bytes(b"hello");
        assert!(verify_bytes(&identity.node_id, b"hello", &sig).is_ok());
    }

    #[test]
    fn verify_fails_on_tampered_payload() {
        let identity = Identity::new();
        let sig = identity.sign_bytes(b"hello");
        assert!(verify_bytes(&identity.node_id, b"goodbye", &sig).is_err());
    }

    #[test]
    fn from_file_creates_then_reloads() {
        let dir = tempdir().unwrap();
        let key_path = dir.path().join("test.key");
        assert!(!key_path.exists());
        let identity = Identity::from_file(&key_path).unwrap();
        assert!(key_path.exists());
        let reloaded = Identity::from_file(&key_path).unwrap();
        assert_eq!(identity.node_id, reloaded.node_id);
    }
}
