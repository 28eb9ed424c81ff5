//! The one binary encoding every hash and wire payload is defined over.
//!
//! `bincode`'s default configuration is deterministic for a fixed `serde`
//! shape: no field reordering, no map-key sorting, fixed-width integers.
//! Anything hashed or sent over the wire goes through [`encode`] so the
//! byte layout a verifier re-derives is exactly what the signer produced.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Serializes `value` with the crate-wide canonical `bincode` configuration.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("canonical encoding is infallible for our types")
}

/// Returns the lowercase hex SHA-256 digest of `value`'s canonical encoding.
pub fn hash_hex<T: Serialize + ?Sized>(value: &T) -> String {
    hex::encode(hash_bytes(value))
}

/// Returns the raw SHA-256 digest of `value`'s canonical encoding.
pub fn hash_bytes<T: Serialize + ?Sized>(value: &T) -> [u8; 32] {
    let encoded = encode(value);
    let digest = Sha256::digest(&encoded);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Returns the lowercase hex SHA-256 digest of raw bytes, used for addresses.
pub fn hash_raw_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Serialize)]
    struct Pair(u32, u32);

    #[test]
    fn encoding_is_deterministic() {
        let a = hash_hex(&Pair(1, 2));
        let b = hash_hex(&Pair(1, 2));
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_values_hash_differently() {
        assert_ne!(hash_hex(&Pair(1, 2)), hash_hex(&Pair(2, 1)));
    }
}
