//! Registration, login and bearer authentication for the single admin.
//!
//! Registration is open exactly until the first admin document exists.
//! Login failures never reveal whether the email is known.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use super::{
    jwt::{TokenError, TokenKeys},
    password::{CredentialError, Credentials},
    repo::{UserRecord, ADMIN_ROLE},
};
use crate::{
    store::{DocumentStore, StoreError},
    validation::{
        char_len_within, is_valid_email, normalize_email, MAX_PASSWORD_LENGTH,
        MIN_PASSWORD_LENGTH,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email")]
    InvalidEmail,
    #[error(
        "Password must be between {} and {} characters",
        MIN_PASSWORD_LENGTH,
        MAX_PASSWORD_LENGTH
    )]
    InvalidPassword,
    #[error("Registration disabled: admin already exists")]
    RegistrationClosed,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Could not validate credentials")]
    Unauthenticated,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Token(TokenError),
}

/// A freshly issued bearer token and the account it belongs to.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub access_token: String,
    pub expires_in: i64,
    pub user: UserRecord,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn DocumentStore>,
    credentials: Credentials,
    keys: TokenKeys,
}

impl AuthService {
    pub fn new(store: Arc<dyn DocumentStore>, credentials: Credentials, keys: TokenKeys) -> Self {
        Self {
            store,
            credentials,
            keys,
        }
    }

    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    #[instrument(skip(self, password))]
    pub async fn register(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let email = normalize_email(email);
        // closed for every input once bootstrapped
        if UserRecord::admin_exists(self.store.as_ref()).await? {
            warn!(%email, "registration attempted after bootstrap");
            return Err(AuthError::RegistrationClosed);
        }

        if !is_valid_email(&email) {
            warn!(%email, "invalid email");
            return Err(AuthError::InvalidEmail);
        }
        if !char_len_within(password, MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH) {
            warn!("password length out of range");
            return Err(AuthError::InvalidPassword);
        }

        let hash = self.credentials.hash(password)?;
        let user = UserRecord::create(self.store.as_ref(), &email, &hash, ADMIN_ROLE).await?;
        let session = self.session_for(user)?;
        info!(user_id = %session.user.id, email = %session.user.email, "admin registered");
        Ok(session)
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let email = normalize_email(email);
        // no account can exist under a malformed address
        if !is_valid_email(&email) {
            self.credentials.verify_dummy(password);
            warn!(%email, "login malformed email");
            return Err(AuthError::InvalidCredentials);
        }

        let Some(user) = UserRecord::find_by_email(self.store.as_ref(), &email).await? else {
            self.credentials.verify_dummy(password);
            warn!(%email, "login unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        match self.credentials.verify(password, &user.password_hash) {
            Ok(true) => {}
            Ok(false) => {
                warn!(%email, user_id = %user.id, "login invalid password");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                error!(error = %e, user_id = %user.id, "stored password hash unusable");
                return Err(AuthError::InvalidCredentials);
            }
        }

        let session = self.session_for(user)?;
        info!(user_id = %session.user.id, email = %session.user.email, "user logged in");
        Ok(session)
    }

    /// Resolve a bearer token to the stored user it names.
    pub async fn authenticate(&self, token: &str) -> Result<UserRecord, AuthError> {
        let subject = self.keys.validate(token).map_err(|e| {
            debug!(error = %e, "token rejected");
            AuthError::Unauthenticated
        })?;
        match UserRecord::find_by_email(self.store.as_ref(), &subject).await? {
            Some(user) => Ok(user),
            None => {
                warn!(email = %subject, "token subject no longer exists");
                Err(AuthError::Unauthenticated)
            }
        }
    }

    fn session_for(&self, user: UserRecord) -> Result<AuthSession, AuthError> {
        let access_token = self
            .keys
            .issue_default(&user.email)
            .map_err(AuthError::Token)?;
        Ok(AuthSession {
            access_token,
            expires_in: self.keys.ttl().whole_seconds(),
            user,
        })
    }
}
