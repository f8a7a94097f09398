//! Authentication for gateway requests
//!
//! Callers present `Authorization: Bearer <token>`. An [`IdentityProvider`]
//! verifies the token and the resolved [`Subject`] selects the session the
//! request is routed to. The bundled provider verifies HS256 JWTs.

use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use http_relay_common::validation::validate_subject;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

static BEARER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^Bearer\s+(.+)$").unwrap());

/// Authentication failures, all surfaced as 401
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingHeader,

    #[error("Could not parse bearer token from header")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Unauthenticated request")]
    Unauthenticated,

    #[error("Could not resolve relay subject")]
    MissingSubject,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}

/// Kind of credential a token represents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Interactive credential held by a person
    #[default]
    Session,
    /// Credential minted for a daemon
    Machine,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Session => f.write_str("session"),
            TokenKind::Machine => f.write_str("machine"),
        }
    }
}

/// JWT Claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>, // Subject (user ID)
    pub exp: i64, // Expiration time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>, // Issued at
    #[serde(default)]
    pub token_type: TokenKind,
    /// Subject a machine credential acts for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Claims {
    /// Resolve the relay subject these claims authenticate
    ///
    /// Session tokens must carry `sub`. Machine tokens prefer the `user_id`
    /// claim and fall back to `sub`.
    pub fn subject(&self) -> Result<Subject, AuthError> {
        let raw = match self.token_type {
            TokenKind::Session => self.sub.as_deref().ok_or(AuthError::InvalidToken)?,
            TokenKind::Machine => self
                .user_id
                .as_deref()
                .or(self.sub.as_deref())
                .ok_or(AuthError::MissingSubject)?,
        };

        validate_subject(raw).map_err(|e| {
            warn!("Rejecting subject: {}", e);
            AuthError::MissingSubject
        })?;

        Ok(Subject(raw.to_string()))
    }
}

/// Stable identifier of one authenticated principal
///
/// Only built from verified claims.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subject(String);

impl Subject {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn for_test(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A freshly minted credential
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Verifies bearer tokens and mints machine credentials
pub trait IdentityProvider: Send + Sync {
    /// Verify a token and return its claims, or `Unauthenticated`
    fn verify(&self, token: &str) -> Result<Claims, AuthError>;

    /// Mint a machine credential acting for `subject`
    fn mint_machine_token(&self, subject: &Subject, ttl: Duration) -> Result<IssuedToken, AuthError>;
}

/// HS256 JWT identity provider with a shared secret
pub struct JwtIdentityProvider {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityProvider {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Mint a token of any kind for a raw subject id
    pub fn mint(&self, subject: &str, kind: TokenKind, ttl: Duration) -> Result<IssuedToken, AuthError> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).map_err(|_| AuthError::InvalidToken)?;
        let expires_at = now + ttl;

        let claims = Claims {
            sub: Some(subject.to_string()),
            exp: expires_at.timestamp(),
            iat: Some(now.timestamp()),
            token_type: kind,
            user_id: (kind == TokenKind::Machine).then(|| subject.to_string()),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            warn!("Failed to sign token: {}", e);
            AuthError::InvalidToken
        })?;

        Ok(IssuedToken { token, expires_at })
    }
}

impl IdentityProvider for JwtIdentityProvider {
    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Token validation failed: {}", e);
                AuthError::Unauthenticated
            })
    }

    fn mint_machine_token(&self, subject: &Subject, ttl: Duration) -> Result<IssuedToken, AuthError> {
        self.mint(subject.as_str(), TokenKind::Machine, ttl)
    }
}

/// Extract the bearer token from the Authorization header
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers.get(AUTHORIZATION).ok_or(AuthError::MissingHeader)?;
    let value = header.to_str().map_err(|_| AuthError::MissingToken)?;

    BEARER_REGEX
        .captures(value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// Authenticate a request, accepting only the listed credential kinds
///
/// Returns the verified claims together with the resolved subject.
pub fn authenticate(
    provider: &dyn IdentityProvider,
    headers: &HeaderMap,
    accepted: &[TokenKind],
) -> Result<(Claims, Subject), AuthError> {
    let token = extract_bearer(headers)?;
    let claims = provider.verify(token)?;

    if !accepted.contains(&claims.token_type) {
        debug!("Rejecting {} credential", claims.token_type);
        return Err(AuthError::Unauthenticated);
    }

    let subject = claims.subject()?;
    Ok((claims, subject))
}
