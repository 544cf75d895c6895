//! Configuration values captured from the environment
//!
//! Identity credentials are checked when the service starts. Datastore settings
//! are only captured here; the persistence gateway validates them on first use.

use josekit::jws::RS256;
use thiserror::Error;

/// Firebase service account used to verify ID tokens
#[derive(Clone)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    /// PEM encoded RSA private key, with real newlines
    pub private_key: String,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceAccountError {
    #[error("[identity] Missing FIREBASE_PROJECT_ID")]
    MissingProjectId,

    #[error("[identity] Missing FIREBASE_CLIENT_EMAIL")]
    MissingClientEmail,

    #[error("[identity] FIREBASE_CLIENT_EMAIL does not look like an email address")]
    InvalidClientEmail,

    #[error("[identity] Missing FIREBASE_PRIVATE_KEY")]
    MissingPrivateKey,

    #[error("[identity] FIREBASE_PRIVATE_KEY is not a valid RSA private key: {0}")]
    InvalidPrivateKey(String),
}

impl ServiceAccount {
    /// Build and validate the service account from raw configuration values.
    ///
    /// The private key is expected with escaped newlines (`\n` as two characters),
    /// which is how it survives being pasted into an environment variable.
    pub fn load(
        project_id: Option<&str>,
        client_email: Option<&str>,
        private_key: Option<&str>,
    ) -> Result<Self, ServiceAccountError> {
        let project_id = non_empty(project_id).ok_or(ServiceAccountError::MissingProjectId)?;
        let client_email =
            non_empty(client_email).ok_or(ServiceAccountError::MissingClientEmail)?;
        if !looks_like_email(&client_email) {
            return Err(ServiceAccountError::InvalidClientEmail);
        }
        let raw_key = non_empty(private_key).ok_or(ServiceAccountError::MissingPrivateKey)?;
        let private_key = unescape_newlines(&raw_key);

        RS256
            .signer_from_pem(private_key.as_bytes())
            .map_err(|e| ServiceAccountError::InvalidPrivateKey(e.to_string()))?;

        Ok(Self {
            project_id,
            client_email,
            private_key,
        })
    }
}

/// Raw datastore settings, validated lazily by [`crate::datastore::Gateway`]
#[derive(Clone, Default)]
pub struct DatastoreSettings {
    /// `SUPABASE_URL`
    pub url: Option<String>,
    /// `NEXT_PUBLIC_SUPABASE_URL`, used when `url` is unset
    pub public_url: Option<String>,
    /// `SUPABASE_SERVICE_ROLE_KEY`
    pub service_key: Option<String>,
}

impl std::fmt::Debug for DatastoreSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatastoreSettings")
            .field("url", &self.url)
            .field("public_url", &self.public_url)
            .field("service_key", &self.service_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl DatastoreSettings {
    /// The base URL, trimmed, preferring `SUPABASE_URL`
    pub fn base_url(&self) -> Option<String> {
        non_empty(self.url.as_deref()).or_else(|| non_empty(self.public_url.as_deref()))
    }

    /// The service credential, trimmed
    pub fn service_key(&self) -> Option<String> {
        non_empty(self.service_key.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn unescape_newlines(value: &str) -> String {
    value.replace("\\n", "\n")
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}
