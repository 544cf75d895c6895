//! PostgREST access to the `notes` table

use notes_core::{Note, NoteContent};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::Response;
use serde::Deserialize;
use url::Url;

use super::{ConfigError, StoreError};

const NOTES_PATH: &str = "rest/v1/notes";
const NOTE_COLUMNS: &str = "id,content,created_at";
const RETURN_REPRESENTATION: &str = "return=representation";

/// HTTP client bound to one datastore project
pub struct PostgrestClient {
    http: reqwest::Client,
    base_url: Url,
    notes_url: Url,
}

impl std::fmt::Debug for PostgrestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestClient")
            .field("notes_url", &self.notes_url.as_str())
            .finish_non_exhaustive()
    }
}

/// PostgREST error body
#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: Option<String>,
}

impl PostgrestClient {
    /// Build a client without validating where `base_url` points.
    ///
    /// The service credential is sent with every request, both as the API key
    /// and as the bearer token.
    pub fn new(base_url: Url, service_key: String) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&service_key)
            .map_err(|_| ConfigError::Client("service key is not a valid header value".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", service_key))
            .map_err(|_| ConfigError::Client("service key is not a valid header value".into()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        let notes_url = base_url
            .join(NOTES_PATH)
            .map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            notes_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `select ... where user_id = ? order by created_at desc`
    pub async fn select_notes(&self, user_id: &str) -> Result<Vec<Note>, StoreError> {
        let owner = eq(user_id);
        let response = self
            .http
            .get(self.notes_url.clone())
            .query(&[
                ("select", NOTE_COLUMNS),
                ("user_id", owner.as_str()),
                ("order", "created_at.desc"),
            ])
            .send()
            .await?;

        let notes = check(response).await?.json::<Vec<Note>>().await?;
        tracing::debug!("Selected {} notes for {}", notes.len(), user_id);
        Ok(notes)
    }

    /// Insert `{user_id, content}` and return the stored row
    pub async fn insert_note(
        &self,
        user_id: &str,
        content: &NoteContent,
    ) -> Result<Note, StoreError> {
        let response = self
            .http
            .post(self.notes_url.clone())
            .query(&[("select", NOTE_COLUMNS)])
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&serde_json::json!({
                "user_id": user_id,
                "content": content.as_str(),
            }))
            .send()
            .await?;

        let rows = check(response).await?.json::<Vec<Note>>().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Unexpected("insert returned no row".into()))
    }

    /// Update content where `id` and `user_id` both match, returning the row if any
    pub async fn update_note(
        &self,
        user_id: &str,
        id: &str,
        content: &NoteContent,
    ) -> Result<Option<Note>, StoreError> {
        let (id, owner) = (eq(id), eq(user_id));
        let response = self
            .http
            .patch(self.notes_url.clone())
            .query(&[
                ("id", id.as_str()),
                ("user_id", owner.as_str()),
                ("select", NOTE_COLUMNS),
            ])
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&serde_json::json!({ "content": content.as_str() }))
            .send()
            .await?;

        let rows = check(response).await?.json::<Vec<Note>>().await?;
        Ok(rows.into_iter().next())
    }

    /// Delete where `id` and `user_id` both match
    pub async fn delete_note(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        let (id, owner) = (eq(id), eq(user_id));
        let response = self
            .http
            .delete(self.notes_url.clone())
            .query(&[("id", id.as_str()), ("user_id", owner.as_str())])
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<PostgrestError>(&body)
        .ok()
        .and_then(|e| e.message)
        .unwrap_or_else(|| {
            if body.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                body
            }
        });

    Err(StoreError::Status {
        status: status.as_u16(),
        message,
    })
}
