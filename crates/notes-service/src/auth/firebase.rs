//! Firebase ID token verification

use std::time::SystemTime;

use async_trait::async_trait;
use josekit::JoseError;
use josekit::jws::JwsVerifier;
use josekit::jwt::{self, JwtPayload};

use super::keys::{GoogleKeys, KeySource};
use super::{Principal, TokenVerifier, VerifyError};

const ISSUER_PREFIX: &str = "https://securetoken.google.com/";
const MAX_SUBJECT_LEN: usize = 128;

/// `iss` claim expected for tokens minted for `project_id`
pub fn issuer_for(project_id: &str) -> String {
    format!("{}{}", ISSUER_PREFIX, project_id)
}

/// Verifies RS256 ID tokens issued for one Firebase project
pub struct FirebaseVerifier<K = GoogleKeys> {
    project_id: String,
    keys: K,
}

impl<K: KeySource> FirebaseVerifier<K> {
    pub fn new(project_id: impl Into<String>, keys: K) -> Self {
        Self {
            project_id: project_id.into(),
            keys,
        }
    }
}

#[async_trait]
impl<K: KeySource> TokenVerifier for FirebaseVerifier<K> {
    async fn verify(&self, token: &str) -> Result<Principal, VerifyError> {
        let keys = self.keys.key_set().await?;

        let (payload, _header) = jwt::decode_with_verifier_selector(token, |header| {
            if header.algorithm() != Some("RS256") {
                return Ok(None);
            }
            Ok(header
                .key_id()
                .and_then(|kid| keys.get(kid))
                .map(|verifier| verifier as &dyn JwsVerifier))
        })
        .map_err(|e| match e {
            JoseError::InvalidSignature(e) => VerifyError::Signature(e.to_string()),
            other => VerifyError::Malformed(other.to_string()),
        })?;

        check_claims(&payload, &self.project_id, SystemTime::now())
    }
}

/// Validate audience, issuer, lifetime and subject, and build the principal.
pub fn check_claims(
    payload: &JwtPayload,
    project_id: &str,
    now: SystemTime,
) -> Result<Principal, VerifyError> {
    let claims = |msg: &str| VerifyError::Claims(msg.to_string());

    let audience = payload.audience().unwrap_or_default();
    if !audience.contains(&project_id) {
        return Err(claims("audience does not match project"));
    }

    if payload.issuer() != Some(issuer_for(project_id).as_str()) {
        return Err(claims("issuer does not match project"));
    }

    match payload.expires_at() {
        Some(exp) if exp > now => {}
        Some(_) => return Err(claims("token has expired")),
        None => return Err(claims("missing exp")),
    }

    match payload.issued_at() {
        Some(iat) if iat <= now => {}
        Some(_) => return Err(claims("token issued in the future")),
        None => return Err(claims("missing iat")),
    }

    let subject = payload.subject().unwrap_or_default();
    if subject.is_empty() {
        return Err(claims("missing subject"));
    }
    if subject.chars().count() > MAX_SUBJECT_LEN {
        return Err(claims("subject too long"));
    }

    let string_claim = |name: &str| {
        payload
            .claim(name)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    Ok(Principal {
        id: subject.to_string(),
        display_name: string_claim("name"),
        email: string_claim("email"),
    })
}
