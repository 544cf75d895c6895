//! Live view of the signed-in user's notes
//!
//! Three background tasks cooperate through channels:
//! - the session listener writes the current token into the token slot on
//!   every session change
//! - the refresher force-refreshes the token on a fixed period while signed in
//!   and writes it into the same slot
//! - the fetcher refetches the list whenever the slot changes to a token or a
//!   revalidation is requested, and publishes a `NotesSnapshot`
//!
//! The slot only notifies when its value actually changes, so the last writer
//! wins and an unchanged token never triggers a refetch.

use std::sync::Arc;
use std::time::Duration;

use notes_core::Note;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::api::NoteApi;
use crate::error::ClientError;
use crate::session::IdentitySession;

/// How often the token is force-refreshed while signed in.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// What a UI would render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotesSnapshot {
    /// `None` until the first successful fetch for the current token
    pub notes: Option<Vec<Note>>,
    /// A fetch is running and there is nothing to show yet
    pub loading: bool,
    /// Message of the last failed fetch
    pub error: Option<String>,
}

pub struct ClientNoteStore {
    api: Arc<NoteApi>,
    token: Arc<watch::Sender<Option<String>>>,
    snapshot: watch::Receiver<NotesSnapshot>,
    revalidate: Arc<Notify>,
    tasks: Vec<JoinHandle<()>>,
}

impl ClientNoteStore {
    /// Start the store for `session`. Must be called inside a tokio runtime.
    pub fn spawn(api: NoteApi, session: Arc<dyn IdentitySession>) -> Self {
        Self::with_refresh_interval(api, session, REFRESH_INTERVAL)
    }

    pub fn with_refresh_interval(
        api: NoteApi,
        session: Arc<dyn IdentitySession>,
        refresh_interval: Duration,
    ) -> Self {
        let api = Arc::new(api);
        let (token_tx, token_rx) = watch::channel(None);
        let token = Arc::new(token_tx);
        let (snapshot_tx, snapshot) = watch::channel(NotesSnapshot::default());
        let revalidate = Arc::new(Notify::new());

        let tasks = vec![
            tokio::spawn(follow_session(session.clone(), token.clone())),
            tokio::spawn(refresh_periodically(session, token.clone(), refresh_interval)),
            tokio::spawn(fetch_on_change(
                api.clone(),
                token_rx,
                revalidate.clone(),
                snapshot_tx,
            )),
        ];

        Self {
            api,
            token,
            snapshot,
            revalidate,
            tasks,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<NotesSnapshot> {
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> NotesSnapshot {
        self.snapshot.borrow().clone()
    }

    /// The token the store currently uses, `None` when signed out.
    pub fn token(&self) -> Option<String> {
        self.token.borrow().clone()
    }

    pub fn watch_token(&self) -> watch::Receiver<Option<String>> {
        self.token.subscribe()
    }

    /// Ask the fetcher to reload the list.
    pub fn revalidate(&self) {
        self.revalidate.notify_one();
    }

    /// Create a note, then reload the list.
    ///
    /// Returns `Ok(None)` without calling the API when the content is blank or
    /// there is no token. The content is sent untrimmed.
    pub async fn create(&self, content: &str) -> Result<Option<Note>, ClientError> {
        if content.trim().is_empty() {
            return Ok(None);
        }
        let Some(token) = self.token() else {
            tracing::debug!("Not signed in, note not created");
            return Ok(None);
        };
        let note = self.api.create(&token, content).await?;
        self.revalidate();
        Ok(Some(note))
    }

    /// Replace a note's content, then reload the list.
    pub async fn update(&self, id: &str, content: &str) -> Result<Option<Note>, ClientError> {
        if content.trim().is_empty() {
            return Ok(None);
        }
        let Some(token) = self.token() else {
            return Ok(None);
        };
        let note = self.api.update(&token, id, content).await?;
        self.revalidate();
        Ok(Some(note))
    }

    /// Delete a note, then reload the list. Returns `false` when skipped.
    pub async fn delete(&self, id: &str) -> Result<bool, ClientError> {
        let Some(token) = self.token() else {
            return Ok(false);
        };
        self.api.delete(&token, id).await?;
        self.revalidate();
        Ok(true)
    }
}

impl Drop for ClientNoteStore {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Store `token` in the slot, notifying only if it differs.
fn set_token(slot: &watch::Sender<Option<String>>, token: Option<String>) {
    slot.send_if_modified(|current| {
        if *current == token {
            false
        } else {
            *current = token;
            true
        }
    });
}

async fn follow_session(
    session: Arc<dyn IdentitySession>,
    slot: Arc<watch::Sender<Option<String>>>,
) {
    let mut changes = session.subscribe();
    loop {
        changes.borrow_and_update();
        match session.id_token(false).await {
            Ok(token) => set_token(&slot, token),
            Err(e) => tracing::warn!("Failed to read ID token: {}", e),
        }
        if changes.changed().await.is_err() {
            tracing::debug!("Identity session closed");
            break;
        }
    }
}

async fn refresh_periodically(
    session: Arc<dyn IdentitySession>,
    slot: Arc<watch::Sender<Option<String>>>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if session.current_user().is_none() {
            continue;
        }
        match session.id_token(true).await {
            Ok(token) => set_token(&slot, token),
            Err(e) => tracing::warn!("Periodic token refresh failed: {}", e),
        }
    }
}

async fn fetch_on_change(
    api: Arc<NoteApi>,
    mut token: watch::Receiver<Option<String>>,
    revalidate: Arc<Notify>,
    snapshot: watch::Sender<NotesSnapshot>,
) {
    let mut fetched_for: Option<String> = None;
    loop {
        let current = token.borrow_and_update().clone();
        match current {
            None => {
                fetched_for = None;
                snapshot.send_replace(NotesSnapshot::default());
            }
            Some(current) => {
                if fetched_for.as_deref() != Some(current.as_str()) {
                    // New key: nothing cached for it yet
                    snapshot.send_replace(NotesSnapshot {
                        notes: None,
                        loading: true,
                        error: None,
                    });
                } else {
                    snapshot.send_if_modified(|s| {
                        let loading = s.notes.is_none();
                        let changed = s.loading != loading;
                        s.loading = loading;
                        changed
                    });
                }

                let result = api.list(&current).await;
                match token.has_changed() {
                    // Answer for a token that is no longer current
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(_) => break,
                }
                fetched_for = Some(current);

                snapshot.send_modify(|s| {
                    s.loading = false;
                    match result {
                        Ok(notes) => {
                            tracing::debug!("Fetched {} notes", notes.len());
                            s.notes = Some(notes);
                            s.error = None;
                        }
                        Err(e) => {
                            tracing::warn!("Failed to load notes: {}", e);
                            s.error = Some(e.to_string());
                        }
                    }
                });
            }
        }

        tokio::select! {
            changed = token.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = revalidate.notified() => {}
        }
    }
}
