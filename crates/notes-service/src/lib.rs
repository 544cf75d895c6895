//! Authenticated notes API
//!
//! Provides:
//! - Bearer token verification against Firebase Authentication
//! - Owner-scoped note persistence over the hosted datastore's PostgREST API
//! - JSON endpoints to list, create, update and delete notes

pub mod auth;
pub mod config;
pub mod datastore;
pub mod error;
pub mod notes;

use std::any::Any;
use std::sync::Arc;

use axum::{
    Router,
    response::{IntoResponse, Response},
    routing::{get, patch},
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::auth::TokenVerifier;
use crate::datastore::NoteStore;
use crate::error::ApiError;

/// Shared application state
pub struct AppState {
    pub verifier: Arc<dyn TokenVerifier>,
    pub notes: Arc<dyn NoteStore>,
}

impl AppState {
    pub fn new(verifier: Arc<dyn TokenVerifier>, notes: Arc<dyn NoteStore>) -> Self {
        Self { verifier, notes }
    }
}

/// Build the note routes
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/notes", get(notes::list).post(notes::create))
        .route(
            "/notes/",
            patch(notes::missing_id).delete(notes::missing_id),
        )
        .route("/notes/{id}", patch(notes::update).delete(notes::delete))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    ApiError::Internal(detail).into_response()
}
