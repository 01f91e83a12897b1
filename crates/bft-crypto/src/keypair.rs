//! Ed25519 keypair for signing outbound envelopes and data payloads.

use crate::error::{CryptoError, Result};
use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// An Ed25519 keypair owned by a single replica or client.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generates a new random keypair.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restores a keypair from a 32-byte secret.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not exactly 32 bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidSecretKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut secret = [0u8; 32];
        secret.copy_from_slice(bytes);
        let secret = Zeroizing::new(secret);
        Ok(Self {
            signing_key: SigningKey::from_bytes(&secret),
        })
    }

    /// Restores a keypair from a hex-encoded 32-byte secret, as carried in
    /// `ReplicaConfig::private_key` (spec §6.2).
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes =
            hex::decode(hex_str).map_err(|e| CryptoError::InvalidSecretKey(e.to_string()))?;
        Self::from_secret_bytes(&bytes)
    }

    /// Returns the public key half of this keypair.
    #[must_use]
    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Returns the raw 32-byte public key.
    #[must_use]
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Signs a message, returning the raw 64-byte signature.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Returns the secret key bytes. Callers must zeroize the result after use.
    #[must_use]
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_self_verify() {
        let kp = Keypair::generate();
        let msg = b"pre-prepare hash bytes";
        let sig = kp.sign(msg);
        let sig = ed25519_dalek::Signature::from_bytes(&sig);
        use ed25519_dalek::Verifier as _;
        assert!(kp.public_key().verify(msg, &sig).is_ok());
    }

    #[test]
    fn from_secret_roundtrip() {
        let kp1 = Keypair::generate();
        let secret = kp1.secret_bytes();
        let kp2 = Keypair::from_secret_bytes(&*secret).unwrap();
        assert_eq!(kp1.public_key_bytes(), kp2.public_key_bytes());
    }

    #[test]
    fn from_hex_with_prefix() {
        let kp1 = Keypair::generate();
        let hex = hex::encode(*kp1.secret_bytes());
        let kp2 = Keypair::from_hex(&format!("0x{hex}")).unwrap();
        assert_eq!(kp1.public_key_bytes(), kp2.public_key_bytes());
    }

    #[test]
    fn rejects_short_secret() {
        assert!(Keypair::from_secret_bytes(&[0u8; 16]).is_err());
    }
}
