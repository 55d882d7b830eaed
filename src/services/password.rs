use bcrypt::{hash, verify, BcryptError};

pub struct PasswordService;

impl PasswordService {
    pub fn hash_password(password: &str) -> Result<String, BcryptError> {
        Self::hash_with_cost(password, crate::config::Config::bcrypt_cost())
    }

    pub fn hash_with_cost(password: &str, cost: u32) -> Result<String, BcryptError> {
        hash(password, cost)
    }

    /// A malformed stored hash counts as a mismatch.
    pub fn verify_password(password: &str, password_hash: &str) -> bool {
        verify(password, password_hash).unwrap_or(false)
    }
}
