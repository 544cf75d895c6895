//! Identity provider signing keys

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use josekit::jwk::{Jwk, JwkSet};
use josekit::jws::{RS256, alg::rsassa::RsassaJwsVerifier};
use reqwest::header::CACHE_CONTROL;
use tokio::sync::RwLock;

use super::VerifyError;

/// Public keys that sign Firebase ID tokens
pub const GOOGLE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Used when the key endpoint doesn't say how long its keys stay valid
const DEFAULT_KEY_TTL: Duration = Duration::from_secs(3600);

/// RS256 verifiers indexed by key id
#[derive(Default)]
pub struct KeySet {
    verifiers: HashMap<String, RsassaJwsVerifier>,
}

impl KeySet {
    /// Build verifiers for every RSA key that carries a key id.
    /// Keys for other algorithms are skipped.
    pub fn from_jwks<'a>(jwks: impl IntoIterator<Item = &'a Jwk>) -> Self {
        let mut verifiers = HashMap::new();
        for jwk in jwks {
            let Some(kid) = jwk.key_id() else {
                continue;
            };
            if jwk.algorithm().is_some_and(|alg| alg != "RS256") {
                tracing::debug!("Skipping key {} with algorithm {:?}", kid, jwk.algorithm());
                continue;
            }
            match RS256.verifier_from_jwk(jwk) {
                Ok(verifier) => {
                    verifiers.insert(kid.to_string(), verifier);
                }
                Err(e) => tracing::warn!("Ignoring unusable signing key {}: {}", kid, e),
            }
        }
        Self { verifiers }
    }

    pub fn get(&self, kid: &str) -> Option<&RsassaJwsVerifier> {
        self.verifiers.get(kid)
    }

    pub fn len(&self) -> usize {
        self.verifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verifiers.is_empty()
    }
}

/// Where the verifier gets its signing keys from.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn key_set(&self) -> Result<Arc<KeySet>, VerifyError>;
}

#[async_trait]
impl KeySource for Arc<KeySet> {
    async fn key_set(&self) -> Result<Arc<KeySet>, VerifyError> {
        Ok(self.clone())
    }
}

struct CachedKeys {
    keys: Arc<KeySet>,
    expires_at: Instant,
}

/// Google's published JWK set, cached for as long as its `Cache-Control` allows.
///
/// Only the keys are cached; every token is still verified on every request.
pub struct GoogleKeys {
    http: reqwest::Client,
    url: String,
    cache: RwLock<Option<CachedKeys>>,
}

impl GoogleKeys {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_url(GOOGLE_JWKS_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            url: url.into(),
            cache: RwLock::new(None),
        })
    }

    async fn fetch(&self) -> Result<CachedKeys, VerifyError> {
        let unavailable = |e: reqwest::Error| VerifyError::KeysUnavailable(e.to_string());

        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(unavailable)?;

        let ttl = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_KEY_TTL);

        let body = response.bytes().await.map_err(unavailable)?;
        let jwks = JwkSet::from_bytes(&body)
            .map_err(|e| VerifyError::KeysUnavailable(e.to_string()))?;
        let keys = KeySet::from_jwks(jwks.keys());
        if keys.is_empty() {
            return Err(VerifyError::KeysUnavailable(
                "key endpoint returned no usable keys".into(),
            ));
        }

        tracing::info!("Fetched {} signing keys, valid for {:?}", keys.len(), ttl);
        Ok(CachedKeys {
            keys: Arc::new(keys),
            expires_at: Instant::now() + ttl,
        })
    }
}

#[async_trait]
impl KeySource for GoogleKeys {
    async fn key_set(&self) -> Result<Arc<KeySet>, VerifyError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.keys.clone());
            }
        }

        let mut cache = self.cache.write().await;
        // Another request may have refreshed while we waited for the lock
        if let Some(cached) = cache.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.keys.clone());
            }
        }

        let fresh = self.fetch().await?;
        let keys = fresh.keys.clone();
        *cache = Some(fresh);
        Ok(keys)
    }
}

/// Read `max-age` out of a `Cache-Control` header value
pub fn parse_max_age(header: &str) -> Option<u64> {
    header
        .split(',')
        .map(str::trim)
        .find_map(|directive| directive.strip_prefix("max-age="))
        .and_then(|secs| secs.trim().parse().ok())
}
