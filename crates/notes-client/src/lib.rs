//! Client side of the notes API
//!
//! - `session`: sign-up, sign-in and ID token refresh against Firebase
//!   Authentication
//! - `api`: typed calls to the note endpoints
//! - `store`: a live, token-driven view of the signed-in user's notes

pub mod api;
pub mod error;
pub mod session;
pub mod store;

pub use api::NoteApi;
pub use error::{ClientError, error_message};
pub use session::{FirebaseSession, IdentitySession, SessionState, User};
pub use store::{ClientNoteStore, NotesSnapshot, REFRESH_INTERVAL};
