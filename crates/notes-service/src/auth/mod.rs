//! Request authentication
//!
//! Every note endpoint starts here: pull the bearer token out of the request,
//! verify it with the identity provider, and hand the resulting principal to
//! the handler. Why a token was rejected is logged but never returned.

mod firebase;
mod keys;

use async_trait::async_trait;
use axum::http::{HeaderMap, header::AUTHORIZATION};
use thiserror::Error;

use crate::error::ApiError;

pub use firebase::{FirebaseVerifier, check_claims, issuer_for};
pub use keys::{GOOGLE_JWKS_URL, GoogleKeys, KeySet, KeySource, parse_max_age};

/// The verified caller of a request. Lives only as long as the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token signature rejected: {0}")]
    Signature(String),

    #[error("invalid token claims: {0}")]
    Claims(String),

    #[error("signing keys unavailable: {0}")]
    KeysUnavailable(String),
}

/// Verifies opaque bearer tokens and resolves them to a principal.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal, VerifyError>;
}

/// Extract the token from an `Authorization` header.
///
/// Accepts `Bearer <token>`. For clients that get the scheme wrong, falls back
/// to the second whitespace-separated word of the header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = match value.strip_prefix("Bearer ") {
        Some(rest) => rest.trim(),
        None => value.split_whitespace().nth(1)?,
    };
    if token.is_empty() { None } else { Some(token) }
}

/// Resolve the request's principal, or fail with `Unauthenticated`.
pub async fn authenticate(
    verifier: &dyn TokenVerifier,
    headers: &HeaderMap,
) -> Result<Principal, ApiError> {
    let Some(token) = bearer_token(headers) else {
        tracing::debug!("No bearer token present");
        return Err(ApiError::Unauthenticated);
    };

    match verifier.verify(token).await {
        Ok(principal) => {
            tracing::debug!("Authenticated request for {}", principal.id);
            Ok(principal)
        }
        Err(e) => {
            tracing::warn!("Token verification failed: {}", e);
            Err(ApiError::Unauthenticated)
        }
    }
}
