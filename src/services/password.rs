//! Password hashing for protected galleries.
//!
//! Hashes are stored as PHC strings so the algorithm parameters travel with
//! the hash and can be changed later without a migration.

use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
        Error as PasswordHashError,
    },
};
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordMatch {
    Match,
    Mismatch,
}

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, secret: &str) -> Result<String, PasswordHashError>;

    /// A malformed stored hash verifies as a mismatch.
    fn verify(&self, hash: &str, candidate: &str) -> PasswordMatch;
}

#[derive(Clone, Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, secret: &str) -> Result<String, PasswordHashError> {
        let salt_bytes: [u8; 16] = rand::rng().random();
        let salt = SaltString::encode_b64(&salt_bytes)?;
        let hash = self.argon2.hash_password(secret.as_bytes(), &salt)?;
        Ok(hash.to_string())
    }

    fn verify(&self, hash: &str, candidate: &str) -> PasswordMatch {
        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(_) => return PasswordMatch::Mismatch,
        };
        match self.argon2.verify_password(candidate.as_bytes(), &parsed) {
            Ok(()) => PasswordMatch::Match,
            Err(_) => PasswordMatch::Mismatch,
        }
    }
}
