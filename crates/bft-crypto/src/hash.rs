//! Content hashing. Spec §6.5: `calculate_hash` must be deterministic and
//! content-addressed; `Request::hash` and `BatchUserRequest::hash` both carry
//! the output of this function so that honest replicas agree on a batch's
//! identity independent of encoding order.

use sha2::{Digest, Sha256};

/// Computes the SHA-256 digest of `data`.
#[must_use]
pub fn calculate_hash(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = calculate_hash(b"same bytes");
        let b = calculate_hash(b"same bytes");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_differs_on_different_input() {
        let a = calculate_hash(b"batch one");
        let b = calculate_hash(b"batch two");
        assert_ne!(a, b);
    }

    #[test]
    fn hash_length_is_32_bytes() {
        assert_eq!(calculate_hash(b"x").len(), 32);
    }
}
