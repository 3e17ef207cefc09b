use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::domain::KeyType;

/// A freshly issued credential. `raw` is shown to the caller exactly once;
/// only `hash`/`prefix` are ever persisted.
pub struct IssuedKey {
    pub raw: String,
    pub hash: String,
    pub prefix: String,
}

/// Generates `hb_{type}_<32 hex chars>` and
/// its SHA-256 hash for storage.
pub fn issue(key_type: KeyType) -> IssuedKey {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    let suffix = hex_encode(&bytes);
    let raw = format!("hb_{}_{}", key_type.as_prefix_tag(), suffix);
    let hash = hash_key(&raw);
    let prefix = raw.chars().take(12).collect();
    IssuedKey { raw, hash, prefix }
}

pub fn hash_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex_encode(&hasher.finalize())
}

/// True if the presented credential looks like an API key rather than a JWT
///.
pub fn looks_like_api_key(credential: &str) -> bool {
    credential.starts_with("hb_")
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_key_hashes_deterministically() {
        let issued = issue(KeyType::Live);
        assert!(issued.raw.starts_with("hb_live_"));
        assert_eq!(hash_key(&issued.raw), issued.hash);
        assert_eq!(issued.prefix.len(), 12);
    }

    #[test]
    fn recognizes_api_key_shape() {
        assert!(looks_like_api_key("hb_live_abcdef"));
        assert!(!looks_like_api_key("eyJhbGciOiJIUzI1NiJ9.x.y"));
    }
}
