//! Bearer-token access gate.
//!
//! Verifies the JSON web token presented on a request and resolves it to a
//! local `User` principal via `UserService::get_or_create`, so callers of
//! the core services can trust the principal without re-checking identity.
//! Key, issuer, and audience come from configuration; the identity provider
//! itself stays external.

use crate::{AppState, config::AppConfig, errors::AppError, models::user::User};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Claims the gate cares about; everything else in the token is ignored.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the provider's stable identifier for the caller.
    pub sub: String,
    /// Display-name hint used when a user is created on first sight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

#[derive(Clone)]
pub struct AuthGate {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AuthGate {
    pub fn new(cfg: &AppConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &cfg.jwt_issuer {
            validation.set_issuer(&[issuer]);
        }
        if let Some(audience) = &cfg.jwt_audience {
            validation.set_audience(&[audience]);
        }
        Self {
            decoding_key: DecodingKey::from_secret(cfg.jwt_secret.as_bytes()),
            validation,
        }
    }

    /// Verify a bearer token and return its claims. All failure modes
    /// (signature, expiry, issuer, audience, malformed token) collapse into
    /// one 401 so callers learn nothing about which check failed.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                debug!("token rejected: {}", err);
                AppError::unauthorized("invalid bearer token")
            })
    }
}

/// The authenticated caller, resolved once per request.
pub struct AuthUser(pub User);

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;

        let claims = state.auth.verify(token)?;
        let display_name = claims.name.as_deref().unwrap_or(&claims.sub);
        let user = state.users.get_or_create(&claims.sub, display_name).await?;
        Ok(AuthUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::test_config;
    use axum::http::StatusCode;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header};

    fn token(secret: &str, exp_offset_secs: i64) -> String {
        let claims = Claims {
            sub: "ext-1".into(),
            name: Some("Alice".into()),
            exp: (Utc::now().timestamp() + exp_offset_secs) as usize,
            iss: None,
            aud: None,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_resolves_claims() {
        let gate = AuthGate::new(&test_config());
        let claims = gate.verify(&token("test-secret", 3600)).unwrap();
        assert_eq!(claims.sub, "ext-1");
        assert_eq!(claims.name.as_deref(), Some("Alice"));
    }

    #[test]
    fn expired_token_is_rejected() {
        let gate = AuthGate::new(&test_config());
        let err = gate.verify(&token("test-secret", -3600)).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn wrong_signature_is_rejected() {
        let gate = AuthGate::new(&test_config());
        assert!(gate.verify(&token("other-secret", 3600)).is_err());
        assert!(gate.verify("not.a.token").is_err());
    }

    #[test]
    fn issuer_mismatch_is_rejected() {
        let mut cfg = test_config();
        cfg.jwt_issuer = Some("https://idp.example.com".into());
        let gate = AuthGate::new(&cfg);
        // Token without an iss claim fails issuer validation.
        assert!(gate.verify(&token("test-secret", 3600)).is_err());
    }
}
