//! Identifier and fingerprint utilities

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::constants::ID_RANDOM_LEN;
use crate::utils::time::now_utc;

/// Generate a random lowercase hex token
pub fn random_hex(length: usize) -> String {
    const CHARSET: &[u8] = b"0123456789abcdef";
    let mut rng = rand::rng();

    (0..length)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

/// Generate an id of the form `PREFIX_<unix-seconds>_<random>`
pub fn generate_id(prefix: &str) -> String {
    format!(
        "{}_{}_{}",
        prefix,
        now_utc().timestamp(),
        random_hex(ID_RANDOM_LEN)
    )
}

/// Hash a string using SHA-256
pub fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Short stable fingerprint used in container labels
pub fn fingerprint(input: &str) -> String {
    let mut hash = hash_string(input);
    hash.truncate(16);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id("TASK");
        let parts: Vec<&str> = id.split('_').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "TASK");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), ID_RANDOM_LEN);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(generate_id("CASE"), generate_id("CASE"));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint("/data/ds1"), fingerprint("/data/ds1"));
        assert_ne!(fingerprint("/data/ds1"), fingerprint("/data/ds2"));
        assert_eq!(fingerprint("/data/ds1").len(), 16);
    }
}
