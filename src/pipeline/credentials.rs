//! Salted password hashing compatible with the stored `users` table
//!
//! Stored hashes are `hex(BLAKE2b-512(base64(password)))` computed with the
//! user's salt in the BLAKE2b parameter block (at most 16 bytes).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Maximum salt length accepted by BLAKE2b
pub const MAX_SALT_BYTES: usize = blake2b_simd::SALTBYTES;

/// Hash `password` with `salt`. Returns `None` when the salt is too long.
pub fn hash_password(password: &str, salt: &str) -> Option<String> {
    if salt.len() > MAX_SALT_BYTES {
        return None;
    }

    let encoded = STANDARD.encode(password.as_bytes());
    let digest = blake2b_simd::Params::new()
        .hash_length(64)
        .salt(salt.as_bytes())
        .hash(encoded.as_bytes());

    Some(hex::encode(digest.as_bytes()))
}

/// Check `password` against a stored salt and hex digest in constant time
pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    hash_password(password, salt)
        .is_some_and(|computed| constant_time_eq(computed.as_bytes(), expected_hash.as_bytes()))
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: &str = "aB3dE6gH9jK2mN5p";

    #[test]
    fn hash_is_hex_encoded_512_bits() {
        let hash = hash_password("DgidXqpt9RI4c7X3t2F3", SALT).unwrap();
        assert_eq!(hash.len(), 128);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn verification_accepts_only_the_right_password() {
        let stored = hash_password("DgidXqpt9RI4c7X3t2F3", SALT).unwrap();

        assert!(verify_password("DgidXqpt9RI4c7X3t2F3", SALT, &stored));
        assert!(!verify_password("wrong", SALT, &stored));
        assert!(!verify_password("DgidXqpt9RI4c7X3t2F3", "otherSaltValue12", &stored));
    }

    #[test]
    fn salt_changes_the_hash() {
        assert_ne!(
            hash_password("secret", SALT),
            hash_password("secret", "0000000000000000")
        );
    }

    #[test]
    fn oversized_salt_is_rejected() {
        let salt = "x".repeat(MAX_SALT_BYTES + 1);
        assert_eq!(hash_password("secret", &salt), None);
        assert!(!verify_password("secret", &salt, ""));
    }

    #[test]
    fn constant_time_eq_handles_length_mismatch() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
