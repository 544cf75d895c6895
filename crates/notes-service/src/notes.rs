//! Note resource handlers
//!
//! Handles:
//! - `GET /notes` - the caller's notes, newest first
//! - `POST /notes` - create a note
//! - `PATCH /notes/{id}` - replace a note's content
//! - `DELETE /notes/{id}` - delete a note
//!
//! Each handler authenticates first, then validates, then makes exactly one
//! owner-scoped datastore call.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State, rejection::BytesRejection},
    http::{HeaderMap, StatusCode},
};
use notes_core::{ContentError, DeleteAck, Note, NoteContent, NoteInput};

use crate::AppState;
use crate::auth::authenticate;
use crate::error::ApiError;

/// Handler for `GET /notes`
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Note>>, ApiError> {
    let principal = authenticate(state.verifier.as_ref(), &headers).await?;

    let notes = state.notes.list(&principal.id).await?;
    tracing::debug!("Listed {} notes for {}", notes.len(), principal.id);
    Ok(Json(notes))
}

/// Handler for `POST /notes`
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<Note>), ApiError> {
    let principal = authenticate(state.verifier.as_ref(), &headers).await?;
    let content = note_content(body)?;

    let note = state.notes.create(&principal.id, &content).await?;
    tracing::info!("Created note {} for {}", note.id, principal.id);
    Ok((StatusCode::CREATED, Json(note)))
}

/// Handler for `PATCH /notes/{id}`
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Note>, ApiError> {
    let principal = authenticate(state.verifier.as_ref(), &headers).await?;
    let id = required_id(&id)?;
    let content = note_content(body)?;

    match state.notes.update(&principal.id, id, &content).await? {
        Some(note) => {
            tracing::info!("Updated note {} for {}", note.id, principal.id);
            Ok(Json(note))
        }
        None => {
            tracing::debug!("No note {} owned by {}", id, principal.id);
            Err(ApiError::NotFound)
        }
    }
}

/// Handler for `DELETE /notes/{id}`
///
/// Deleting a note that is already gone, or never belonged to the caller,
/// still succeeds and changes nothing.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<DeleteAck>, ApiError> {
    let principal = authenticate(state.verifier.as_ref(), &headers).await?;
    let id = required_id(&id)?;

    state.notes.delete(&principal.id, id).await?;
    tracing::info!("Deleted note {} for {}", id, principal.id);
    Ok(Json(DeleteAck::default()))
}

/// Handler for `PATCH /notes/` and `DELETE /notes/`
pub async fn missing_id(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiError {
    match authenticate(state.verifier.as_ref(), &headers).await {
        Ok(_) => ApiError::missing_id(),
        Err(e) => e,
    }
}

fn required_id(id: &str) -> Result<&str, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::missing_id());
    }
    Ok(id)
}

/// Validated content of a request body.
///
/// A body over the transport limit cannot hold valid content either.
fn note_content(body: Result<Bytes, BytesRejection>) -> Result<NoteContent, ApiError> {
    match body {
        Ok(bytes) => Ok(NoteInput::from_body(&bytes).validate()?),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            tracing::debug!("Rejected oversized body: {}", rejection.body_text());
            Err(ContentError::TooLong.into())
        }
        Err(rejection) => {
            tracing::debug!("Unreadable body: {}", rejection.body_text());
            Err(ContentError::Empty.into())
        }
    }
}
