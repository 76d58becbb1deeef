//! HS256 bearer tokens.
//!
//! Claims: `sub` is the user id, `admin` grants the admin routes, `exp` and
//! `iat` are unix seconds.

use chrono::{Duration, Utc};
use domains::{Caller, DomainError, IdentityProvider, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_TTL_SECS: u64 = 365 * 24 * 3600;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    admin: bool,
    iat: i64,
    exp: i64,
}

pub struct JwtIdentityProvider {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtIdentityProvider {
    pub fn new(secret: &SecretString, ttl_secs: u64) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            validation,
            ttl: Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64),
        }
    }

    /// Mints a token for `user_id`. Used by the seed tool and tests; real
    /// sessions are issued by the account service in front of this API.
    pub fn issue(&self, user_id: Uuid, is_admin: bool) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            admin: is_admin,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(DomainError::internal)
    }
}

impl IdentityProvider for JwtIdentityProvider {
    fn verify(&self, token: &str) -> Result<Caller> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|err| {
            tracing::debug!(error = %err, "bearer token rejected");
            DomainError::Unauthorized("invalid or expired token".into())
        })?;
        let user_id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| DomainError::Unauthorized("token subject is not a user id".into()))?;
        Ok(Caller { user_id, is_admin: data.claims.admin })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> JwtIdentityProvider {
        JwtIdentityProvider::new(&SecretString::from("test-secret-long-enough-for-hs256"), 3600)
    }

    #[test]
    fn issued_tokens_verify() {
        let auth = provider();
        let user = Uuid::new_v4();
        let token = auth.issue(user, true).unwrap();

        let caller = auth.verify(&token).unwrap();
        assert_eq!(caller, Caller { user_id: user, is_admin: true });
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let other = JwtIdentityProvider::new(&SecretString::from("some-other-secret-entirely"), 3600);
        let token = other.issue(Uuid::new_v4(), false).unwrap();

        let err = provider().verify(&token).unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let auth = provider();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            admin: false,
            iat: Utc::now().timestamp() - 7200,
            exp: Utc::now().timestamp() - 3600,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &auth.encoding).unwrap();

        assert!(matches!(auth.verify(&token), Err(DomainError::Unauthorized(_))));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(provider().verify("not.a.jwt"), Err(DomainError::Unauthorized(_))));
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        let auth = provider();
        let claims = Claims {
            sub: "alice".into(),
            admin: false,
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 60,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &auth.encoding).unwrap();

        assert!(matches!(auth.verify(&token), Err(DomainError::Unauthorized(_))));
    }
}
