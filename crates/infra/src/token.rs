//! HS256 access tokens and opaque refresh tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;

use warden_auth::{
    AccessClaims, ActorRef, IssuedToken, TokenIssuer, TokenValidationError, validate_claims,
};
use warden_core::{AuthError, AuthResult, SessionId, codes};

use crate::config::Config;

const JTI_BYTES: usize = 16;
const REFRESH_BYTES: usize = 32;

/// Issues signed access tokens bound to a session, and random refresh tokens.
#[derive(Clone)]
pub struct JwtTokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for JwtTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtTokenIssuer")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl JwtTokenIssuer {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.jwt_secret.as_bytes(),
            config.access_token_ttl,
            config.refresh_token_ttl,
        )
    }

    /// Check the signature and time window of an access token and return its
    /// claims. Session lookup stays with the caller.
    pub fn verify(&self, token: &str) -> AuthResult<AccessClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by `validate_claims` without leeway.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<AccessClaims>(token, &self.decoding, &validation).map_err(|e| {
            AuthError::token_invalid(codes::INVALID_ACCESS_TOKEN, "access token rejected")
                .with_source(e)
        })?;

        validate_claims(&data.claims, Utc::now()).map_err(|e| match e {
            TokenValidationError::Expired => {
                AuthError::token_expired(codes::ACCESS_TOKEN_EXPIRED, e.to_string())
            }
            TokenValidationError::NotYetValid | TokenValidationError::InvalidTimeWindow => {
                AuthError::token_invalid(codes::INVALID_ACCESS_TOKEN, e.to_string())
            }
        })?;
        Ok(data.claims)
    }
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl TokenIssuer for JwtTokenIssuer {
    fn generate_access_token(&self, session_id: SessionId, actor: &ActorRef) -> AuthResult<IssuedToken> {
        let issued_at = Utc::now();
        let expires_at = issued_at + self.access_ttl;
        let claims = AccessClaims::new(session_id, actor, random_hex(JTI_BYTES), issued_at, expires_at);

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            AuthError::persistence("access token signing failed").with_source(e)
        })?;
        Ok(IssuedToken { token, expires_at })
    }

    fn generate_refresh_token(&self) -> AuthResult<IssuedToken> {
        Ok(IssuedToken {
            token: random_hex(REFRESH_BYTES),
            expires_at: Utc::now() + self.refresh_ttl,
        })
    }
}
