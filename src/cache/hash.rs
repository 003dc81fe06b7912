//! Content hashing for cache keys and generated identifiers.

use sha2::{Digest, Sha256};

/// SHA256 of a string, as 64 lowercase hex characters.
pub fn hash_str(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_str_deterministic() {
        assert_eq!(hash_str("orders"), hash_str("orders"));
        assert_ne!(hash_str("orders"), hash_str("orders "));
        assert_eq!(hash_str("orders").len(), 64);
    }

    #[test]
    fn test_hash_str_matches_known_digest() {
        assert_eq!(
            hash_str("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
