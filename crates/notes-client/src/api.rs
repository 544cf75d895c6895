//! Typed calls to the notes API.

use notes_core::{DeleteAck, Note, NoteInput};
use reqwest::{RequestBuilder, Response};
use url::Url;

use crate::error::{ClientError, error_message};

/// HTTP client for `/notes` on one API base URL.
#[derive(Debug, Clone)]
pub struct NoteApi {
    http: reqwest::Client,
    notes_url: Url,
}

impl NoteApi {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Result<Self, ClientError> {
        let mut base = Url::parse(base_url.trim())?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let notes_url = base.join("notes")?;
        Ok(Self { http, notes_url })
    }

    /// The collection endpoint, e.g. `http://localhost:3000/notes`
    pub fn notes_url(&self) -> &Url {
        &self.notes_url
    }

    fn note_url(&self, id: &str) -> Url {
        let mut url = self.notes_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(id);
        }
        url
    }

    pub async fn list(&self, token: &str) -> Result<Vec<Note>, ClientError> {
        let response = send(bearer(self.http.get(self.notes_url.clone()), token)).await?;
        Ok(response.json().await?)
    }

    /// Create a note. The content is sent as given; the server trims it.
    pub async fn create(&self, token: &str, content: &str) -> Result<Note, ClientError> {
        let request = bearer(self.http.post(self.notes_url.clone()), token).json(&body(content));
        let response = send(request).await?;
        Ok(response.json().await?)
    }

    pub async fn update(&self, token: &str, id: &str, content: &str) -> Result<Note, ClientError> {
        let request = bearer(self.http.patch(self.note_url(id)), token).json(&body(content));
        let response = send(request).await?;
        Ok(response.json().await?)
    }

    pub async fn delete(&self, token: &str, id: &str) -> Result<(), ClientError> {
        let response = send(bearer(self.http.delete(self.note_url(id)), token)).await?;
        let _: DeleteAck = response.json().await?;
        Ok(())
    }
}

fn body(content: &str) -> NoteInput {
    NoteInput {
        content: Some(content.to_string()),
    }
}

fn bearer(request: RequestBuilder, token: &str) -> RequestBuilder {
    request.header(reqwest::header::AUTHORIZATION, format!("Bearer {}", token))
}

async fn send(request: RequestBuilder) -> Result<Response, ClientError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let raw = response.text().await.unwrap_or_default();
    let message = error_message(&raw);
    tracing::debug!("Notes API answered {}: {}", status.as_u16(), message);
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}
