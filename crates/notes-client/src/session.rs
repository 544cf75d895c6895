//! Identity session
//!
//! `IdentitySession` is what the note store needs from the identity provider:
//! the current ID token and a signal whenever sign-in state or the token
//! changes. `FirebaseSession` implements it over the Firebase Authentication
//! REST API (Identity Toolkit for accounts, Secure Token for refresh).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;

use crate::error::ClientError;

pub const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Tokens closer than this to expiry are refreshed before being handed out.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

const AUTH_FALLBACK_MESSAGE: &str = "Authentication failed";

/// The signed-in account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl User {
    /// Display name, falling back to the email address.
    pub fn greeting_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.email.as_deref())
            .unwrap_or(&self.uid)
    }
}

/// Published on every sign-in, sign-out and token refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    SignedOut,
    SignedIn(User),
}

impl SessionState {
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::SignedOut => None,
            SessionState::SignedIn(user) => Some(user),
        }
    }
}

#[async_trait]
pub trait IdentitySession: Send + Sync {
    /// The current ID token, or `None` when signed out.
    ///
    /// `force_refresh` fetches a fresh token even if the cached one is valid.
    async fn id_token(&self, force_refresh: bool) -> Result<Option<String>, ClientError>;

    /// Receiver that is notified on every session change.
    fn subscribe(&self) -> watch::Receiver<SessionState>;

    fn current_user(&self) -> Option<User>;
}

struct Tokens {
    user: User,
    id_token: String,
    refresh_token: String,
    expires_at: Instant,
}

impl Tokens {
    fn needs_refresh(&self) -> bool {
        self.expires_at.saturating_duration_since(Instant::now()) <= REFRESH_MARGIN
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileUpdate<'a> {
    id_token: &'a str,
    display_name: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

/// Firebase Authentication over REST, with the session held in memory.
pub struct FirebaseSession {
    http: reqwest::Client,
    api_key: String,
    identity_url: String,
    token_url: String,
    tokens: Mutex<Option<Tokens>>,
    state: watch::Sender<SessionState>,
}

impl FirebaseSession {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoints(api_key, IDENTITY_TOOLKIT_URL, SECURE_TOKEN_URL)
    }

    /// Point the session at other endpoints, such as the Auth emulator.
    pub fn with_endpoints(
        api_key: impl Into<String>,
        identity_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::SignedOut);
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            identity_url: identity_url.into().trim_end_matches('/').to_string(),
            token_url: token_url.into(),
            tokens: Mutex::new(None),
            state,
        }
    }

    /// Create an account, then set its display name when one is given.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<User, ClientError> {
        let account: AccountResponse = self
            .call(
                "signUp",
                &Credentials {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        let mut tokens = tokens_from(account, None)?;

        if let Some(name) = display_name.map(str::trim).filter(|n| !n.is_empty()) {
            let updated: AccountResponse = self
                .call(
                    "update",
                    &ProfileUpdate {
                        id_token: &tokens.id_token,
                        display_name: name,
                        return_secure_token: true,
                    },
                )
                .await?;
            tokens.user.display_name = updated.display_name.clone().or(Some(name.to_string()));
            if updated.id_token.is_some() {
                tokens = tokens_from(updated, Some(tokens))?;
            }
        }

        tracing::info!("Signed up as {}", tokens.user.uid);
        Ok(self.store(tokens).await)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let account: AccountResponse = self
            .call(
                "signInWithPassword",
                &Credentials {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        let tokens = tokens_from(account, None)?;
        tracing::info!("Signed in as {}", tokens.user.uid);
        Ok(self.store(tokens).await)
    }

    /// Forget the session locally.
    pub async fn sign_out(&self) {
        let mut slot = self.tokens.lock().await;
        if let Some(tokens) = slot.take() {
            tracing::info!("Signed out {}", tokens.user.uid);
        }
        self.state.send_replace(SessionState::SignedOut);
    }

    async fn store(&self, tokens: Tokens) -> User {
        let user = tokens.user.clone();
        let mut slot = self.tokens.lock().await;
        *slot = Some(tokens);
        self.state.send_replace(SessionState::SignedIn(user.clone()));
        user
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/accounts:{}", self.identity_url, method);
        let request = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(body);
        parse_response(request.send().await?).await
    }

    async fn refresh(&self, tokens: &mut Tokens) -> Result<(), ClientError> {
        let request = self
            .http
            .post(&self.token_url)
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", tokens.refresh_token.as_str()),
            ]);
        let refreshed: RefreshResponse = parse_response(request.send().await?).await?;

        tokens.id_token = refreshed.id_token;
        tokens.refresh_token = refreshed.refresh_token;
        tokens.expires_at = expires_at(Some(&refreshed.expires_in));
        tracing::debug!("Refreshed ID token for {}", tokens.user.uid);
        Ok(())
    }
}

#[async_trait]
impl IdentitySession for FirebaseSession {
    async fn id_token(&self, force_refresh: bool) -> Result<Option<String>, ClientError> {
        let mut guard = self.tokens.lock().await;
        let Some(tokens) = guard.as_mut() else {
            return Ok(None);
        };
        if force_refresh || tokens.needs_refresh() {
            self.refresh(tokens).await?;
            let token = tokens.id_token.clone();
            // State and tokens only change together, under the lock
            self.state
                .send_replace(SessionState::SignedIn(tokens.user.clone()));
            return Ok(Some(token));
        }
        Ok(Some(tokens.id_token.clone()))
    }

    fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn current_user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }
}

fn tokens_from(account: AccountResponse, previous: Option<Tokens>) -> Result<Tokens, ClientError> {
    let missing = || ClientError::Auth(AUTH_FALLBACK_MESSAGE.to_string());
    let (id_token, refresh_token) = match (account.id_token, account.refresh_token, &previous) {
        (Some(id), Some(refresh), _) => (id, refresh),
        (Some(id), None, Some(prev)) => (id, prev.refresh_token.clone()),
        _ => return Err(missing()),
    };
    let display_name = account
        .display_name
        .filter(|n| !n.is_empty())
        .or_else(|| previous.as_ref().and_then(|p| p.user.display_name.clone()));
    Ok(Tokens {
        user: User {
            uid: account.local_id,
            email: account.email,
            display_name,
        },
        id_token,
        refresh_token,
        expires_at: expires_at(account.expires_in.as_deref()),
    })
}

/// Token lifetime from `expiresIn` seconds, one hour when absent.
fn expires_at(expires_in: Option<&str>) -> Instant {
    let secs = expires_in
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(3600);
    Instant::now() + Duration::from_secs(secs)
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    let raw = response.text().await?;
    if !status.is_success() {
        let message = provider_message(&raw);
        tracing::warn!("Identity provider answered {}: {}", status.as_u16(), message);
        return Err(ClientError::Auth(message));
    }
    serde_json::from_str(&raw).map_err(|e| {
        tracing::warn!("Unreadable identity provider response: {}", e);
        ClientError::Auth(AUTH_FALLBACK_MESSAGE.to_string())
    })
}

/// The provider's error message, e.g. `EMAIL_EXISTS`.
fn provider_message(raw: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return AUTH_FALLBACK_MESSAGE.to_string();
    };
    let error = &value["error"];
    error["message"]
        .as_str()
        .or_else(|| error.as_str())
        .or_else(|| value["error_description"].as_str())
        .filter(|m| !m.is_empty())
        .unwrap_or(AUTH_FALLBACK_MESSAGE)
        .to_string()
}
