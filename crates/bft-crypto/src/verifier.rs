//! The `Verifier` interface (spec §6.5) and an in-memory key-store
//! implementation.
//!
//! `InMemoryVerifier` keeps a `parking_lot::RwLock`-guarded map from node id
//! to public key. Per spec §5's shared-resource policy, the only writer is
//! the heartbeat handler (`bft-consensus::manager`); every sender/verifier in
//! the system only reads it.

use crate::error::{CryptoError, Result};
use crate::keypair::Keypair;
use bft_types::{HashType, NodeType, PublicKeyInfo, SignatureInfo};
use ed25519_dalek::{Signature as DalekSignature, Verifier as _, VerifyingKey};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Cryptographic operations required by the consensus and transport layers.
///
/// Implementations must be `Send + Sync`: the dispatcher, the broadcast
/// drain task, and every executor thread call into it concurrently.
pub trait Verifier: Send + Sync {
    /// Signs `data` with this node's own key, returning a wire-ready
    /// signature record.
    ///
    /// # Errors
    ///
    /// Returns an error if this verifier has no local signing key configured
    /// (e.g. `signature_verifier_enabled = false`).
    fn sign_message(&self, data: &[u8]) -> Result<SignatureInfo>;

    /// Verifies `signature` was produced over `data` by the key on file for
    /// `signature.node_id`.
    fn verify_message(&self, data: &[u8], signature: &SignatureInfo) -> bool;

    /// Computes a deterministic content hash of `data`.
    fn calculate_hash(&self, data: &[u8]) -> Vec<u8>;

    /// Records a peer's public key, as distributed via heartbeat (spec §4.J).
    ///
    /// Returns `false` and does not mutate state if `info` is malformed
    /// (empty key bytes or a replica entry with no routable address) or
    /// duplicates an already-known key bit-for-bit.
    fn add_public_key(&self, info: &PublicKeyInfo) -> bool;

    /// Returns this node's own id, if configured.
    fn self_id(&self) -> Option<u32>;
}

/// An in-memory, parking_lot-guarded key store keyed by node id.
pub struct InMemoryVerifier {
    self_id: Option<u32>,
    signing_key: Option<Keypair>,
    keys: RwLock<HashMap<u32, VerifyingKey>>,
}

impl InMemoryVerifier {
    /// Creates a verifier with no local signing key (verify-only).
    #[must_use]
    pub fn verify_only() -> Self {
        Self {
            self_id: None,
            signing_key: None,
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a verifier that can also sign as `self_id` using `keypair`,
    /// and seeds the key store with `self_id`'s own public key.
    #[must_use]
    pub fn with_signing_key(self_id: u32, keypair: Keypair) -> Self {
        let mut keys = HashMap::new();
        keys.insert(self_id, keypair.public_key());
        Self {
            self_id: Some(self_id),
            signing_key: Some(keypair),
            keys: RwLock::new(keys),
        }
    }

    /// Directly inserts a known key, bypassing the malformed-entry checks of
    /// `add_public_key`. Used by tests and by static roster bootstrapping.
    pub fn insert_key(&self, node_id: u32, key: VerifyingKey) {
        self.keys.write().insert(node_id, key);
    }

    /// Number of distinct node ids with a key on file.
    #[must_use]
    pub fn known_key_count(&self) -> usize {
        self.keys.read().len()
    }

    fn key_for(&self, node_id: u32) -> Option<VerifyingKey> {
        self.keys.read().get(&node_id).copied()
    }
}

impl Verifier for InMemoryVerifier {
    fn sign_message(&self, data: &[u8]) -> Result<SignatureInfo> {
        let (id, keypair) = match (self.self_id, &self.signing_key) {
            (Some(id), Some(kp)) => (id, kp),
            _ => {
                return Err(CryptoError::InvalidSecretKey(
                    "verifier has no local signing key".into(),
                ))
            }
        };
        let sig = keypair.sign(data);
        Ok(SignatureInfo::new(sig.to_vec(), id, HashType::Sha256))
    }

    fn verify_message(&self, data: &[u8], signature: &SignatureInfo) -> bool {
        let Some(key) = self.key_for(signature.node_id) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature.sig.as_slice()) else {
            return false;
        };
        let sig = DalekSignature::from_bytes(&sig_bytes);
        key.verify(data, &sig).is_ok()
    }

    fn calculate_hash(&self, data: &[u8]) -> Vec<u8> {
        crate::hash::calculate_hash(data)
    }

    fn add_public_key(&self, info: &PublicKeyInfo) -> bool {
        if info.key_bytes.len() != 32 {
            return false;
        }
        if info.node_type == NodeType::Replica && (info.ip.is_empty() || info.port == 0) {
            return false;
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&info.key_bytes);
        let Ok(key) = VerifyingKey::from_bytes(&arr) else {
            return false;
        };

        let mut keys = self.keys.write();
        if let Some(existing) = keys.get(&info.node_id) {
            if existing.to_bytes() == key.to_bytes() {
                return false;
            }
        }
        keys.insert(info.node_id, key);
        true
    }

    fn self_id(&self) -> Option<u32> {
        self.self_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_info(node_id: u32, key: &VerifyingKey, routable: bool) -> PublicKeyInfo {
        PublicKeyInfo {
            node_id,
            node_type: NodeType::Replica,
            region: 0,
            ip: if routable { "127.0.0.1".into() } else { String::new() },
            port: if routable { 9000 } else { 0 },
            key_bytes: key.to_bytes().to_vec(),
        }
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = Keypair::generate();
        let verifier = InMemoryVerifier::with_signing_key(1, kp);
        let data = b"hello replicas";
        let sig = verifier.sign_message(data).unwrap();
        assert!(verifier.verify_message(data, &sig));
    }

    #[test]
    fn verify_fails_for_unknown_signer() {
        let verifier = InMemoryVerifier::verify_only();
        let sig = SignatureInfo::new(vec![0; 64], 99, HashType::Sha256);
        assert!(!verifier.verify_message(b"data", &sig));
    }

    #[test]
    fn verify_fails_on_tampered_data() {
        let kp = Keypair::generate();
        let verifier = InMemoryVerifier::with_signing_key(1, kp);
        let sig = verifier.sign_message(b"original").unwrap();
        assert!(!verifier.verify_message(b"tampered", &sig));
    }

    #[test]
    fn add_public_key_rejects_malformed_entries() {
        let verifier = InMemoryVerifier::verify_only();
        let kp = Keypair::generate();
        let bad = key_info(2, &kp.public_key(), false);
        assert!(!verifier.add_public_key(&bad));
        assert_eq!(verifier.known_key_count(), 0);
    }

    #[test]
    fn add_public_key_accepts_valid_and_rejects_exact_duplicate() {
        let verifier = InMemoryVerifier::verify_only();
        let kp = Keypair::generate();
        let info = key_info(2, &kp.public_key(), true);
        assert!(verifier.add_public_key(&info));
        assert_eq!(verifier.known_key_count(), 1);
        assert!(!verifier.add_public_key(&info));
        assert_eq!(verifier.known_key_count(), 1);
    }

    #[test]
    fn calculate_hash_is_deterministic() {
        let verifier = InMemoryVerifier::verify_only();
        assert_eq!(
            verifier.calculate_hash(b"same"),
            verifier.calculate_hash(b"same")
        );
    }
}
