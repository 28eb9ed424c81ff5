//! Address derivation and signing on NIST P-384.
//!
//! Keys are never stored; every operation re-derives a [`p384::ecdsa::SigningKey`]
//! from a seed on demand. Seed-to-scalar conversion uses a "try, try again"
//! loop: expand the seed with a counter through SHA-256 until the candidate
//! bytes parse as a valid nonzero scalar below the curve order, exactly as
//! many seed-based key-derivation schemes in this ecosystem do when they
//! don't have a direct hash-to-scalar primitive available.

use ecdsa::signature::{Signer, Verifier};
use p384::ecdsa::{Signature, SigningKey, VerifyingKey};
use p384::elliptic_curve::sec1::ToEncodedPoint;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::canonical::hash_raw_hex;

/// Length in ASCII characters of a freshly generated seed.
pub const SEED_LEN: usize = 48;

/// Generates a fresh, cryptographically random seed.
pub fn new_seed() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..SEED_LEN)
        .map(|_| {
            let idx = (rng.next_u32() as usize) % CHARSET.len();
            CHARSET[idx] as char
        })
        .collect()
}

/// Expands `seed` and `counter` into 48 candidate bytes via repeated SHA-256.
fn candidate_bytes(seed: &str, counter: u64) -> [u8; 48] {
    let mut out = [0u8; 48];
    let mut produced = 0usize;
    let mut block: u64 = 0;
    while produced < out.len() {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(counter.to_be_bytes());
        hasher.update(block.to_be_bytes());
        let digest = hasher.finalize();
        let take = std::cmp::min(digest.len(), out.len() - produced);
        out[produced..produced + take].copy_from_slice(&digest[..take]);
        produced += take;
        block += 1;
    }
    out
}

/// Deterministically derives a P-384 signing key from `seed` by trying
/// successive candidates until one is a valid nonzero scalar in `[1, order)`.
pub fn derive_signing_key(seed: &str) -> SigningKey {
    let mut counter = 0u64;
    loop {
        let candidate = candidate_bytes(seed, counter);
        if let Ok(secret) = p384::SecretKey::from_slice(&candidate) {
            return SigningKey::from(secret);
        }
        counter += 1;
    }
}

/// Returns the raw SEC1 uncompressed bytes of the public key for `seed`.
pub fn verifying_key_bytes(seed: &str) -> Vec<u8> {
    let signing_key = derive_signing_key(seed);
    verifying_key_to_bytes(signing_key.verifying_key())
}

fn verifying_key_to_bytes(key: &VerifyingKey) -> Vec<u8> {
    key.to_encoded_point(false).as_bytes().to_vec()
}

/// Derives the address (hex SHA-256 of the public key bytes) for `seed`.
pub fn address(seed: &str) -> String {
    hash_raw_hex(&verifying_key_bytes(seed))
}

/// Signs `tx_hash_hex` (as ASCII bytes) with the key derived from `seed`,
/// returning `(signature_bytes, verifying_key_bytes)`.
pub fn sign(seed: &str, tx_hash_hex: &str) -> (Vec<u8>, Vec<u8>) {
    let signing_key = derive_signing_key(seed);
    let signature: Signature = signing_key.sign(tx_hash_hex.as_bytes());
    let verifying_key = verifying_key_to_bytes(signing_key.verifying_key());
    (signature.to_der().as_bytes().to_vec(), verifying_key)
}

/// Returns true iff `verifying_key_bytes` hashes to `address_hex`.
pub fn verify_address(address_hex: &str, verifying_key_bytes: &[u8]) -> bool {
    hash_raw_hex(verifying_key_bytes).eq_ignore_ascii_case(address_hex)
}

/// Returns true iff `signature_bytes` is a valid P-384 ECDSA signature over
/// `tx_hash_hex` under `verifying_key_bytes`. Never panics: malformed keys
/// or signatures simply fail to verify.
pub fn verify_signature(tx_hash_hex: &str, signature_bytes: &[u8], verifying_key_bytes: &[u8]) -> bool {
    let key = match VerifyingKey::from_sec1_bytes(verifying_key_bytes) {
        Ok(k) => k,
        Err(_) => return false,
    };
    let signature = match Signature::from_der(signature_bytes) {
        Ok(s) => s,
        Err(_) => return false,
    };
    key.verify(tx_hash_hex.as_bytes(), &signature).is_ok()
}

/// Derives the address corresponding to a raw verifying-key byte string,
/// independent of any seed. Used when checking ownership of an output whose
/// verifying key is known but whose seed is not.
pub fn address_of_key(verifying_key_bytes: &[u8]) -> String {
    hash_raw_hex(verifying_key_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_matches_verify_address() {
        let seed = new_seed();
        let addr = address(&seed);
        let key_bytes = verifying_key_bytes(&seed);
        assert!(verify_address(&addr, &key_bytes));
    }

    #[test]
    fn signature_round_trips() {
        let seed = new_seed();
        let (sig, key) = sign(&seed, "deadbeef");
        assert!(verify_signature("deadbeef", &sig, &key));
    }

    #[test]
    fn signature_fails_for_wrong_message() {
        let seed = new_seed();
        let (sig, key) = sign(&seed, "deadbeef");
        assert!(!verify_signature("not-deadbeef", &sig, &key));
    }

    #[test]
    fn derivation_is_deterministic() {
        let seed = new_seed();
        assert_eq!(address(&seed), address(&seed));
    }

    #[test]
    fn malformed_key_fails_closed() {
        assert!(!verify_signature("deadbeef", &[1, 2, 3], &[4, 5, 6]));
    }
}
