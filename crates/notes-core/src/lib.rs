//! Shared note model for the notes service and its clients.
//!
//! Provides:
//! - `Note`, the only persisted entity, in its wire shape
//! - `NoteContent`, the validated form of a note body
//! - Request/response bodies used by the HTTP contract

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum note length, counted in characters after trimming.
pub const MAX_CONTENT_CHARS: usize = 5000;

/// A note as returned by the API. The owner id never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("Content is required")]
    Empty,

    #[error("Content too long")]
    TooLong,
}

/// Note body that has passed validation: trimmed, 1 to `MAX_CONTENT_CHARS` characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NoteContent(String);

impl NoteContent {
    pub fn parse(raw: &str) -> Result<Self, ContentError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ContentError::Empty);
        }
        if trimmed.chars().count() > MAX_CONTENT_CHARS {
            return Err(ContentError::TooLong);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Body of `POST /notes` and `PATCH /notes/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteInput {
    #[serde(default)]
    pub content: Option<String>,
}

impl NoteInput {
    /// Lenient decode of a request body.
    ///
    /// An empty, unparseable or non-object body, or a `content` that is not a
    /// string, all decode to an input without content.
    pub fn from_body(body: &[u8]) -> Self {
        let value: serde_json::Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(_) => return Self::default(),
        };
        let content = value
            .get("content")
            .and_then(|c| c.as_str())
            .map(str::to_string);
        Self { content }
    }

    pub fn validate(&self) -> Result<NoteContent, ContentError> {
        NoteContent::parse(self.content.as_deref().unwrap_or(""))
    }
}

/// Error body returned for every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

/// Body of a successful `DELETE /notes/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAck {
    pub ok: bool,
}

impl Default for DeleteAck {
    fn default() -> Self {
        Self { ok: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_is_trimmed() {
        let content = NoteContent::parse("  Buy milk \n").unwrap();
        assert_eq!(content.as_str(), "Buy milk");
    }

    #[test]
    fn test_blank_content_rejected() {
        assert_eq!(NoteContent::parse(""), Err(ContentError::Empty));
        assert_eq!(NoteContent::parse(" \t\n "), Err(ContentError::Empty));
    }

    #[test]
    fn test_length_limit_counts_characters_after_trim() {
        let at_limit = "é".repeat(MAX_CONTENT_CHARS);
        assert!(NoteContent::parse(&format!("  {}  ", at_limit)).is_ok());

        let over = "a".repeat(MAX_CONTENT_CHARS + 1);
        assert_eq!(NoteContent::parse(&over), Err(ContentError::TooLong));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(ContentError::Empty.to_string(), "Content is required");
        assert_eq!(ContentError::TooLong.to_string(), "Content too long");
    }

    #[test]
    fn test_input_from_body_is_lenient() {
        assert_eq!(NoteInput::from_body(b"").content, None);
        assert_eq!(NoteInput::from_body(b"not json").content, None);
        assert_eq!(NoteInput::from_body(b"[1, 2]").content, None);
        assert_eq!(NoteInput::from_body(br#"{"content": 42}"#).content, None);
        assert_eq!(
            NoteInput::from_body(br#"{"content": "hi"}"#).content.as_deref(),
            Some("hi")
        );
    }

    #[test]
    fn test_missing_content_is_empty() {
        assert_eq!(NoteInput::default().validate(), Err(ContentError::Empty));
    }

    #[test]
    fn test_note_wire_shape() {
        let note: Note = serde_json::from_str(
            r#"{"id":"n1","content":"hello","created_at":"2024-05-01T10:00:00.123456+00:00"}"#,
        )
        .unwrap();
        assert_eq!(note.id, "n1");

        let json = serde_json::to_value(&note).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert!(obj["created_at"].as_str().unwrap().starts_with("2024-05-01T10:00:00"));
    }

    #[test]
    fn test_delete_ack() {
        assert_eq!(
            serde_json::to_string(&DeleteAck::default()).unwrap(),
            r#"{"ok":true}"#
        );
    }
}
