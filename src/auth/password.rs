use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::PasswordConfig;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("invalid argon2 parameters: {0}")]
    Params(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),
}

/// Argon2id hashing with a configurable work factor.
#[derive(Clone)]
pub struct Credentials {
    argon2: Argon2<'static>,
    // verified against when the account does not exist, so both login
    // failures cost one argon2 run
    dummy_hash: String,
}

impl Credentials {
    pub fn new(cfg: &PasswordConfig) -> Result<Self, CredentialError> {
        let params = Params::new(
            cfg.m_cost.unwrap_or(Params::DEFAULT_M_COST),
            cfg.t_cost.unwrap_or(Params::DEFAULT_T_COST),
            cfg.p_cost.unwrap_or(Params::DEFAULT_P_COST),
            None,
        )
        .map_err(|e| CredentialError::Params(e.to_string()))?;

        let mut credentials = Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            dummy_hash: String::new(),
        };
        credentials.dummy_hash = credentials.hash("placeholder-password")?;
        Ok(credentials)
    }

    pub fn hash(&self, plain: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                CredentialError::Hash(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// `Ok(false)` on mismatch; `Err` only when `hash` is not a PHC string.
    pub fn verify(&self, plain: &str, hash: &str) -> Result<bool, CredentialError> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            CredentialError::MalformedHash(e.to_string())
        })?;
        Ok(self
            .argon2
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    pub fn verify_dummy(&self, plain: &str) {
        let _ = self.verify(plain, &self.dummy_hash);
    }
}
