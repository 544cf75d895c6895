//! End-to-end tests for the note endpoints.
//!
//! Drives the real router with a fixed-token verifier and the in-memory
//! store, so every request goes through the same authentication, validation
//! and error mapping as production.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use notes_core::{MAX_CONTENT_CHARS, Note, NoteContent};
use notes_service::auth::{Principal, TokenVerifier, VerifyError};
use notes_service::config::DatastoreSettings;
use notes_service::datastore::{Gateway, MemoryNoteStore, NoteStore, StoreError};
use notes_service::{AppState, router};
use serde_json::{Value, json};
use tower::ServiceExt;

const ALICE: &str = "token-alice";
const BOB: &str = "token-bob";

/// Accepts a fixed set of tokens.
struct FixedTokens(HashMap<&'static str, Principal>);

impl FixedTokens {
    fn new() -> Self {
        let principal = |id: &str| Principal {
            id: id.to_string(),
            display_name: None,
            email: Some(format!("{}@example.com", id)),
        };
        Self(HashMap::from([(ALICE, principal("alice")), (BOB, principal("bob"))]))
    }
}

#[async_trait]
impl TokenVerifier for FixedTokens {
    async fn verify(&self, token: &str) -> Result<Principal, VerifyError> {
        self.0
            .get(token)
            .cloned()
            .ok_or_else(|| VerifyError::Signature("unknown token".into()))
    }
}

/// Wraps a store and counts how often it is touched.
struct Counting<S> {
    inner: S,
    calls: AtomicUsize,
}

#[async_trait]
impl<S: NoteStore> NoteStore for Counting<S> {
    async fn list(&self, user_id: &str) -> Result<Vec<Note>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list(user_id).await
    }

    async fn create(&self, user_id: &str, content: &NoteContent) -> Result<Note, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create(user_id, content).await
    }

    async fn update(
        &self,
        user_id: &str,
        id: &str,
        content: &NoteContent,
    ) -> Result<Option<Note>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.update(user_id, id, content).await
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(user_id, id).await
    }
}

/// Fails every call the way an unreachable datastore would.
struct BrokenStore;

#[async_trait]
impl NoteStore for BrokenStore {
    async fn list(&self, _: &str) -> Result<Vec<Note>, StoreError> {
        Err(StoreError::Status {
            status: 503,
            message: "connection refused by upstream 10.0.0.7".into(),
        })
    }

    async fn create(&self, _: &str, _: &NoteContent) -> Result<Note, StoreError> {
        panic!("insert exploded");
    }

    async fn update(&self, _: &str, _: &str, _: &NoteContent) -> Result<Option<Note>, StoreError> {
        Err(StoreError::Unexpected("bad row".into()))
    }

    async fn delete(&self, _: &str, _: &str) -> Result<(), StoreError> {
        Err(StoreError::Unexpected("bad row".into()))
    }
}

struct TestApp {
    app: Router,
    store: Arc<Counting<MemoryNoteStore>>,
}

impl TestApp {
    fn new() -> Self {
        let store = Arc::new(Counting {
            inner: MemoryNoteStore::new(),
            calls: AtomicUsize::new(0),
        });
        let state = AppState::new(Arc::new(FixedTokens::new()), store.clone());
        Self {
            app: router(Arc::new(state)),
            store,
        }
    }

    fn store_calls(&self) -> usize {
        self.store.calls.load(Ordering::SeqCst)
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        send(&self.app, method, uri, token, body.map(|b| b.to_string())).await
    }

    async fn create(&self, token: &str, content: &str) -> Note {
        let (status, body) = self
            .send("POST", "/notes", Some(token), Some(json!({ "content": content })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        serde_json::from_value(body).unwrap()
    }

    async fn list(&self, token: &str) -> Vec<Note> {
        let (status, body) = self.send("GET", "/notes", Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_value(body).unwrap()
    }
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<String>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body)),
        None => request.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

#[tokio::test]
async fn test_create_then_list() {
    let app = TestApp::new();

    let (status, body) = app
        .send("POST", "/notes", Some(ALICE), Some(json!({ "content": "Buy milk" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["content"], "Buy milk");
    assert!(uuid_like(body["id"].as_str().unwrap()));
    assert!(body["created_at"].is_string());
    assert!(body.get("user_id").is_none());

    let notes = app.list(ALICE).await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id, body["id"].as_str().unwrap());
}

#[tokio::test]
async fn test_list_is_newest_first() {
    let app = TestApp::new();
    app.create(ALICE, "first").await;
    app.create(ALICE, "second").await;
    let newest = app.create(ALICE, "Buy milk").await;

    let notes = app.list(ALICE).await;
    assert_eq!(notes.len(), 3);
    assert_eq!(notes[0], newest);
    assert!(notes.windows(2).all(|w| w[0].created_at >= w[1].created_at));
}

#[tokio::test]
async fn test_created_content_is_trimmed() {
    let app = TestApp::new();
    let note = app.create(ALICE, "  \n spaced out \t ").await;
    assert_eq!(note.content, "spaced out");
}

#[tokio::test]
async fn test_content_at_limit_is_accepted() {
    let app = TestApp::new();
    let content = "x".repeat(MAX_CONTENT_CHARS);
    let note = app.create(ALICE, &format!(" {} ", content)).await;
    assert_eq!(note.content, content);
}

#[tokio::test]
async fn test_invalid_content_creates_nothing() {
    let app = TestApp::new();

    let cases = [
        (json!({ "content": "" }), "Content is required"),
        (json!({ "content": "    " }), "Content is required"),
        (json!({}), "Content is required"),
        (json!({ "content": 7 }), "Content is required"),
        (
            json!({ "content": "x".repeat(MAX_CONTENT_CHARS + 1) }),
            "Content too long",
        ),
    ];
    for (body, message) in cases {
        let (status, response) = app.send("POST", "/notes", Some(ALICE), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"], message);
    }

    let (status, response) =
        send(&app.app, "POST", "/notes", Some(ALICE), Some("{not json".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "Content is required");

    assert!(app.store.inner.is_empty().await);
}

#[tokio::test]
async fn test_oversized_body_keeps_error_contract() {
    let app = TestApp::new();
    let huge = json!({ "content": "x".repeat(3 * 1024 * 1024) }).to_string();

    let (status, body) = send(&app.app, "POST", "/notes", None, Some(huge.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Unauthorized" }));

    let (status, body) = send(&app.app, "POST", "/notes", Some(ALICE), Some(huge.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Content too long" }));

    let note = app.create(ALICE, "small").await;
    let uri = format!("/notes/{}", note.id);
    let (status, body) = send(&app.app, "PATCH", &uri, Some(ALICE), Some(huge)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Content too long");
    assert_eq!(app.store.inner.get(&note.id).await.unwrap().content, "small");
    assert_eq!(app.store.inner.len().await, 1);
}

#[tokio::test]
async fn test_missing_token_queries_nothing() {
    let app = TestApp::new();

    let (status, body) = app.send("GET", "/notes", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Unauthorized" }));

    let (status, _) = app
        .send("POST", "/notes", None, Some(json!({ "content": "hi" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(app.store_calls(), 0);
}

#[tokio::test]
async fn test_invalid_token_is_unauthorized() {
    let app = TestApp::new();

    let (status, body) = app.send("GET", "/notes", Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = app.send("DELETE", "/notes/abc", Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.store_calls(), 0);
}

#[tokio::test]
async fn test_malformed_scheme_falls_back_to_second_word() {
    let app = TestApp::new();
    let request = Request::builder()
        .method("GET")
        .uri("/notes")
        .header(header::AUTHORIZATION, format!("bearer {}", ALICE))
        .body(Body::empty())
        .unwrap();

    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_update_then_list() {
    let app = TestApp::new();
    let note = app.create(ALICE, "draft").await;

    let (status, body) = app
        .send(
            "PATCH",
            &format!("/notes/{}", note.id),
            Some(ALICE),
            Some(json!({ "content": " final " })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "final");
    assert_eq!(body["id"], note.id.as_str());

    let notes = app.list(ALICE).await;
    assert_eq!(notes[0].content, "final");
    assert_eq!(notes[0].created_at, note.created_at);
}

#[tokio::test]
async fn test_update_validates_content() {
    let app = TestApp::new();
    let note = app.create(ALICE, "keep me").await;

    let (status, body) = app
        .send(
            "PATCH",
            &format!("/notes/{}", note.id),
            Some(ALICE),
            Some(json!({ "content": "   " })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Content is required");
    assert_eq!(app.store.inner.get(&note.id).await.unwrap().content, "keep me");
}

#[tokio::test]
async fn test_other_users_note_is_not_found() {
    let app = TestApp::new();
    let note = app.create(ALICE, "private").await;

    let (status, body) = app
        .send(
            "PATCH",
            &format!("/notes/{}", note.id),
            Some(BOB),
            Some(json!({ "content": "hijacked" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Not found" }));

    let (status, _) = app
        .send("DELETE", &format!("/notes/{}", note.id), Some(BOB), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(app.store.inner.get(&note.id).await, Some(note));
    assert!(app.list(BOB).await.is_empty());
}

#[tokio::test]
async fn test_patch_unknown_id_is_not_found() {
    let app = TestApp::new();
    app.store
        .inner
        .insert_with_id("alice", "abc", &NoteContent::parse("owned by alice").unwrap())
        .await;

    let (status, body) = app
        .send("PATCH", "/notes/abc", Some(BOB), Some(json!({ "content": "x" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");

    let (status, _) = app
        .send("PATCH", "/notes/nope", Some(ALICE), Some(json!({ "content": "x" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_then_list() {
    let app = TestApp::new();
    let keep = app.create(ALICE, "keep").await;
    let gone = app.create(ALICE, "gone").await;

    let (status, body) = app
        .send("DELETE", &format!("/notes/{}", gone.id), Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));

    let notes = app.list(ALICE).await;
    assert_eq!(notes, vec![keep]);
}

#[tokio::test]
async fn test_repeated_delete_is_harmless() {
    let app = TestApp::new();
    let note = app.create(ALICE, "once").await;
    app.create(ALICE, "other").await;
    let uri = format!("/notes/{}", note.id);

    for _ in 0..2 {
        let (status, body) = app.send("DELETE", &uri, Some(ALICE), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
    }
    assert_eq!(app.store.inner.len().await, 1);
}

#[tokio::test]
async fn test_missing_id() {
    let app = TestApp::new();

    let (status, body) = app
        .send("PATCH", "/notes/", Some(ALICE), Some(json!({ "content": "x" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing note id");

    let (status, body) = app.send("DELETE", "/notes/", Some(ALICE), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing note id");

    let (status, _) = app.send("DELETE", "/notes/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.store_calls(), 0);
}

#[tokio::test]
async fn test_misconfigured_datastore_reports_diagnostic() {
    let gateway = Gateway::new(DatastoreSettings {
        url: Some("https://project.supabase.co".into()),
        public_url: None,
        service_key: None,
    });
    let state = AppState::new(Arc::new(FixedTokens::new()), Arc::new(gateway));
    let app = router(Arc::new(state));

    let (status, body) = send(&app, "GET", "/notes", Some(ALICE), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "[datastore] Missing SUPABASE_SERVICE_ROLE_KEY");
}

#[tokio::test]
async fn test_datastore_failures_are_sanitized() {
    let state = AppState::new(Arc::new(FixedTokens::new()), Arc::new(BrokenStore));
    let app = router(Arc::new(state));

    let (status, body) = send(&app, "GET", "/notes", Some(ALICE), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Datastore request failed");
    assert!(!body.to_string().contains("10.0.0.7"));

    let (status, body) = send(&app, "DELETE", "/notes/abc", Some(ALICE), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Datastore request failed");
}

#[tokio::test]
async fn test_panics_become_internal_errors() {
    let state = AppState::new(Arc::new(FixedTokens::new()), Arc::new(BrokenStore));
    let app = router(Arc::new(state));

    let (status, body) = send(
        &app,
        "POST",
        "/notes",
        Some(ALICE),
        Some(json!({ "content": "boom" }).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Internal server error" }));
}

fn uuid_like(id: &str) -> bool {
    id.len() == 36 && id.chars().filter(|c| *c == '-').count() == 4
}
