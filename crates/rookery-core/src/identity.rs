//! Id derivation and the dev identity scheme
//!
//! Every entity id is a 64-character lowercase hex string: the sha256 digest
//! of a freshly minted uuid v7. Caller identities use the same shape, derived
//! by hashing an opaque secret token; recovering an identity from a request
//! signature is the boundary's job (see `rookery-server`).

use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Length of an entity or identity id in hex characters.
pub const ID_LENGTH: usize = 64;

/// Generate a fresh 64-hex entity id.
pub fn generate_id() -> String {
    hash_of(Uuid::now_v7().to_string().as_bytes())
}

/// Sha256 digest as lowercase hex.
pub fn hash_of(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Derive the identity id for a secret token.
pub fn identity_of(secret: &str) -> String {
    hash_of(secret.as_bytes())
}

/// Generate a random secret token (64 hex chars) plus its derived identity.
pub fn generate_secret() -> (String, String) {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    let secret = hex::encode(bytes);
    let id = identity_of(&secret);
    (secret, id)
}

/// Check that a string looks like a valid id.
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LENGTH && id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_valid_and_unique() {
        let a = generate_id();
        let b = generate_id();
        assert!(is_valid_id(&a));
        assert!(is_valid_id(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_identity_derivation_is_deterministic() {
        let (secret, id) = generate_secret();
        assert!(is_valid_id(&id));
        assert_eq!(identity_of(&secret), id);
    }

    #[test]
    fn test_id_validation() {
        assert!(!is_valid_id("abc"));
        assert!(!is_valid_id(&"G".repeat(64)));
        assert!(!is_valid_id(&"A".repeat(64)));
        assert!(is_valid_id(&"a".repeat(64)));
    }
}
