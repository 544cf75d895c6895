use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use notes_core::{Note, NoteContent};
use tokio::sync::RwLock;

use super::{NoteStore, StoreError};

struct StoredNote {
    user_id: String,
    note: Note,
}

/// In-process note store with the same owner scoping as the hosted datastore.
///
/// Timestamps are kept strictly increasing so "newest first" is well defined
/// even for notes created within the same clock tick.
#[derive(Default)]
pub struct MemoryNoteStore {
    rows: RwLock<Vec<StoredNote>>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored notes across all owners
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Look up a note regardless of owner
    pub async fn get(&self, id: &str) -> Option<Note> {
        self.rows
            .read()
            .await
            .iter()
            .find(|r| r.note.id == id)
            .map(|r| r.note.clone())
    }

    /// Insert a note with a caller-chosen id
    pub async fn insert_with_id(&self, user_id: &str, id: &str, content: &NoteContent) -> Note {
        let mut rows = self.rows.write().await;
        let created_at = next_timestamp(rows.last().map(|r| r.note.created_at));
        let note = Note {
            id: id.to_string(),
            content: content.as_str().to_string(),
            created_at,
        };
        rows.push(StoredNote {
            user_id: user_id.to_string(),
            note: note.clone(),
        });
        note
    }
}

fn next_timestamp(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match last {
        Some(last) if now <= last => last + Duration::microseconds(1),
        _ => now,
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn list(&self, user_id: &str) -> Result<Vec<Note>, StoreError> {
        let rows = self.rows.read().await;
        let mut notes: Vec<Note> = rows
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.note.clone())
            .collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes)
    }

    async fn create(&self, user_id: &str, content: &NoteContent) -> Result<Note, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        Ok(self.insert_with_id(user_id, &id, content).await)
    }

    async fn update(
        &self,
        user_id: &str,
        id: &str,
        content: &NoteContent,
    ) -> Result<Option<Note>, StoreError> {
        let mut rows = self.rows.write().await;
        let updated = rows
            .iter_mut()
            .find(|r| r.note.id == id && r.user_id == user_id)
            .map(|r| {
                r.note.content = content.as_str().to_string();
                r.note.clone()
            });
        Ok(updated)
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        rows.retain(|r| !(r.note.id == id && r.user_id == user_id));
        Ok(())
    }
}
