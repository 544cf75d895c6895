use async_trait::async_trait;
use notes_core::{Note, NoteContent};
use once_cell::sync::OnceCell;
use thiserror::Error;
use url::Url;

use super::{NoteStore, PostgrestClient, StoreError};
use crate::config::DatastoreSettings;

/// Every hosted datastore URL lives under this domain
pub const EXPECTED_HOST_SUFFIX: &str = ".supabase.co";

/// Left behind when a value is copied from a UI that elides long strings
const TRUNCATION_MARKER: &str = "...";

/// Datastore misconfiguration. Each check has its own message so a bad
/// deployment can be diagnosed from the error text alone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("[datastore] Missing SUPABASE_SERVICE_ROLE_KEY")]
    MissingServiceKey,

    #[error("[datastore] Missing SUPABASE_URL (or NEXT_PUBLIC_SUPABASE_URL)")]
    MissingUrl,

    #[error("[datastore] SUPABASE_URL appears truncated. Please paste the full URL.")]
    TruncatedUrl,

    #[error("[datastore] SUPABASE_SERVICE_ROLE_KEY appears truncated. Please paste the full key.")]
    TruncatedServiceKey,

    #[error("[datastore] Invalid SUPABASE_URL: {0}")]
    InvalidUrl(String),

    #[error("[datastore] Invalid SUPABASE_URL: URL must start with https://")]
    InsecureUrl,

    #[error("[datastore] Invalid SUPABASE_URL: URL host must end with .supabase.co")]
    UnexpectedHost,

    #[error("[datastore] Failed to build datastore client: {0}")]
    Client(String),
}

/// Process-wide handle to the datastore.
///
/// Built once in `main` and shared through the router state. The client itself
/// is created on first use and never changes afterwards; a failed validation
/// leaves the cell empty so the next call reports the same problem.
pub struct Gateway {
    settings: DatastoreSettings,
    client: OnceCell<PostgrestClient>,
}

impl Gateway {
    pub fn new(settings: DatastoreSettings) -> Self {
        Self {
            settings,
            client: OnceCell::new(),
        }
    }

    /// The shared client, constructing it on first call.
    pub fn client(&self) -> Result<&PostgrestClient, ConfigError> {
        self.client.get_or_try_init(|| {
            let (url, service_key) = validate(&self.settings)?;
            let client = PostgrestClient::new(url, service_key)?;
            tracing::info!("Datastore client ready for {}", client.base_url());
            Ok(client)
        })
    }
}

/// Check the settings in order: credential, URL, truncation, scheme, host.
pub(crate) fn validate(settings: &DatastoreSettings) -> Result<(Url, String), ConfigError> {
    let service_key = settings.service_key().ok_or(ConfigError::MissingServiceKey)?;
    let raw_url = settings.base_url().ok_or(ConfigError::MissingUrl)?;

    if raw_url.contains(TRUNCATION_MARKER) {
        return Err(ConfigError::TruncatedUrl);
    }
    if service_key.contains(TRUNCATION_MARKER) {
        return Err(ConfigError::TruncatedServiceKey);
    }

    let url = Url::parse(&raw_url).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;
    if url.scheme() != "https" {
        return Err(ConfigError::InsecureUrl);
    }
    match url.host_str() {
        Some(host) if host.ends_with(EXPECTED_HOST_SUFFIX) => {}
        _ => return Err(ConfigError::UnexpectedHost),
    }

    Ok((url, service_key))
}

#[async_trait]
impl NoteStore for Gateway {
    async fn list(&self, user_id: &str) -> Result<Vec<Note>, StoreError> {
        self.client()?.select_notes(user_id).await
    }

    async fn create(&self, user_id: &str, content: &NoteContent) -> Result<Note, StoreError> {
        self.client()?.insert_note(user_id, content).await
    }

    async fn update(
        &self,
        user_id: &str,
        id: &str,
        content: &NoteContent,
    ) -> Result<Option<Note>, StoreError> {
        self.client()?.update_note(user_id, id, content).await
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        self.client()?.delete_note(user_id, id).await
    }
}
