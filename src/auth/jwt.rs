use std::sync::Arc;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::Duration;
use tracing::debug;

use super::claims::Claims;
use crate::{clock::Clock, config::JwtConfig};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    Expired,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

/// Signing and verification keys with claim settings. Built once at startup.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenKeys {
    pub fn new(cfg: &JwtConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::minutes(cfg.ttl_minutes),
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<String, TokenError> {
        let now = self.clock.now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        debug!(subject, exp = claims.exp, "jwt signed");
        Ok(token)
    }

    pub fn issue_default(&self, subject: &str) -> Result<String, TokenError> {
        self.issue(subject, self.ttl)
    }

    /// Returns the `sub` claim. Expiry is checked against the injected clock.
    pub fn validate(&self, token: &str) -> Result<String, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.validate_exp = false;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            TokenError::InvalidToken
        })?;

        if self.clock.now().unix_timestamp() > data.claims.exp {
            debug!(subject = %data.claims.sub, "jwt expired");
            return Err(TokenError::Expired);
        }
        debug!(subject = %data.claims.sub, "jwt verified");
        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn jwt_config(secret: &str, issuer: &str, audience: &str) -> JwtConfig {
        JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 5,
        }
    }

    fn make_keys(secret: &str, clock: Arc<ManualClock>) -> TokenKeys {
        TokenKeys::new(&jwt_config(secret, "test-issuer", "test-aud"), clock)
    }

    #[test]
    fn issue_and_validate() {
        let keys = make_keys("dev-secret", Arc::new(ManualClock::default()));
        let token = keys.issue_default("admin@example.com").expect("sign");
        assert_eq!(keys.validate(&token).unwrap(), "admin@example.com");
    }

    #[test]
    fn expires_once_ttl_has_passed() {
        let clock = Arc::new(ManualClock::default());
        let keys = make_keys("dev-secret", clock.clone());
        let token = keys.issue("a@b.co", Duration::seconds(60)).unwrap();

        clock.advance(Duration::seconds(60));
        assert!(keys.validate(&token).is_ok(), "exp itself is still valid");

        clock.advance(Duration::seconds(1));
        assert_eq!(keys.validate(&token), Err(TokenError::Expired));
    }

    #[test]
    fn rejects_wrong_secret() {
        let clock = Arc::new(ManualClock::default());
        let good = make_keys("secret-one", clock.clone());
        let bad = make_keys("secret-two", clock);
        let token = good.issue_default("a@b.co").unwrap();
        assert_eq!(bad.validate(&token), Err(TokenError::InvalidToken));
    }

    #[test]
    fn rejects_wrong_issuer_or_audience() {
        let clock = Arc::new(ManualClock::default());
        let good = TokenKeys::new(&jwt_config("same", "good-iss", "good-aud"), clock.clone());
        let bad_iss = TokenKeys::new(&jwt_config("same", "bad-iss", "good-aud"), clock.clone());
        let bad_aud = TokenKeys::new(&jwt_config("same", "good-iss", "bad-aud"), clock);
        let token = good.issue_default("a@b.co").unwrap();
        assert_eq!(bad_iss.validate(&token), Err(TokenError::InvalidToken));
        assert_eq!(bad_aud.validate(&token), Err(TokenError::InvalidToken));
    }

    #[test]
    fn rejects_malformed_token() {
        let keys = make_keys("dev-secret", Arc::new(ManualClock::default()));
        assert_eq!(keys.validate("invalid.token.here"), Err(TokenError::InvalidToken));
        assert_eq!(keys.validate(""), Err(TokenError::InvalidToken));
    }

    #[test]
    fn default_ttl_comes_from_config() {
        let keys = make_keys("dev-secret", Arc::new(ManualClock::default()));
        assert_eq!(keys.ttl(), Duration::minutes(5));
    }
}
