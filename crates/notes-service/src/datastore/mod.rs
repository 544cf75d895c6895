//! Persistence for notes
//!
//! Every operation takes the owner's id and filters on it, so a caller can
//! never read or change a note belonging to somebody else. A note owned by
//! another user looks exactly like a note that doesn't exist.
//!
//! Implementations:
//! - `Gateway` - Lazily validated PostgREST client for the hosted datastore
//! - `MemoryNoteStore` - In-process store for testing

mod gateway;
mod memory;
mod postgrest;

use async_trait::async_trait;
use notes_core::{Note, NoteContent};
use thiserror::Error;

pub use gateway::{ConfigError, EXPECTED_HOST_SUFFIX, Gateway};
pub use memory::MemoryNoteStore;
pub use postgrest::PostgrestClient;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("datastore request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("datastore returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected datastore response: {0}")]
    Unexpected(String),
}

/// Owner-scoped note storage.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// All notes of `user_id`, newest first
    async fn list(&self, user_id: &str) -> Result<Vec<Note>, StoreError>;

    /// Insert a note owned by `user_id` and return the stored row
    async fn create(&self, user_id: &str, content: &NoteContent) -> Result<Note, StoreError>;

    /// Replace the content of note `id` if it belongs to `user_id`.
    ///
    /// Returns `None` when no row matched.
    async fn update(
        &self,
        user_id: &str,
        id: &str,
        content: &NoteContent,
    ) -> Result<Option<Note>, StoreError>;

    /// Delete note `id` if it belongs to `user_id`. Deleting nothing is not an error.
    async fn delete(&self, user_id: &str, id: &str) -> Result<(), StoreError>;
}
