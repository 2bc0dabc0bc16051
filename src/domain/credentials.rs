//! Salted password digests for accounts kept in the local store

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 over `salt || password`, both hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash {
    salt: String,
    digest: String,
}

impl PasswordHash {
    /// Hash a password under a fresh random salt
    pub fn new(password: &str) -> Self {
        let salt: [u8; 16] = rand::random();
        Self {
            salt: hex::encode(salt),
            digest: digest(&salt, password),
        }
    }

    /// Check a candidate password against this digest
    pub fn verify(&self, password: &str) -> bool {
        match hex::decode(&self.salt) {
            Ok(salt) => digest(&salt, password) == self.digest,
            Err(_) => false,
        }
    }
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}
