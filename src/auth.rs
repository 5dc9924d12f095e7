use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Salted SHA-256, hex-encoded. The salt is stored alongside the hash so
/// two users with the same password never share a digest.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn new_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn verify_password(stored_hash: &str, stored_salt: &str, password: &str) -> bool {
    hash_password(password, stored_salt) == stored_hash
}
