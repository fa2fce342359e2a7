//! Password auth client for the managed backend's `/auth/v1` endpoints.
//!
//! DESIGN
//! ======
//! Holds the current session in memory, optionally mirrored to a JSON file
//! so a restarted client resumes signed in. Every state change is published
//! on a broadcast channel; the session router is the main subscriber.
//!
//! ERROR HANDLING
//! ==============
//! Sign-out never fails the caller: the local session and its file are
//! dropped before the remote logout is attempted, and a rejected remote
//! logout is only logged. A refresh rejected by the server
//! (non-retryable) ends the session locally; transport failures during
//! refresh are surfaced so the caller can treat them as "unknown".

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use super::http::send;
use super::types::{AuthChange, AuthEvent, AuthUser, BackendError, ProfileAttrs, Session};
use super::AuthProvider;
use crate::config::StampcardConfig;

/// Refresh sessions this close to expiry before handing them out.
pub const REFRESH_MARGIN_SECS: i64 = 60;
const EVENT_CAPACITY: usize = 16;
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

// =============================================================================
// CLIENT
// =============================================================================

pub struct RemoteAuth {
    http: reqwest::Client,
    auth_url: String,
    anon_key: String,
    session: RwLock<Option<Session>>,
    store: Option<SessionFile>,
    events: broadcast::Sender<AuthChange>,
}

impl RemoteAuth {
    /// Create the client, restoring a persisted session if one is configured.
    #[must_use]
    pub fn new(http: reqwest::Client, config: &StampcardConfig) -> Self {
        let store = config.session_file.clone().map(SessionFile::new);
        let restored = store.as_ref().and_then(SessionFile::load);
        if let Some(session) = &restored {
            debug!(principal = %session.principal(), "restored persisted session");
        }
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            http,
            auth_url: format!("{}/auth/v1", config.backend_url),
            anon_key: config.anon_key.clone(),
            session: RwLock::new(restored),
            store,
            events,
        }
    }

    #[must_use]
    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    /// Bearer token for data requests: the session's access token when
    /// signed in, otherwise `None` and callers fall back to the anon key.
    pub async fn access_token(&self) -> Option<String> {
        match self.current_session().await {
            Ok(session) => session.map(|s| s.access_token),
            Err(e) => {
                warn!(error = %e, "session unavailable; using anonymous access");
                None
            }
        }
    }

    async fn post(&self, path: &str, bearer: Option<&str>, body: &serde_json::Value) -> Result<String, BackendError> {
        let mut request = self
            .http
            .post(format!("{}{path}", self.auth_url))
            .header("apikey", &self.anon_key)
            .json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        send(request).await
    }

    async fn install(&self, session: Session, event: AuthEvent) {
        *self.session.write().await = Some(session.clone());
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&session).await {
                warn!(error = %e, "failed to persist session");
            }
        }
        let _ = self.events.send(AuthChange { event, session: Some(session) });
    }

    /// Drop the local session and its file, returning what was dropped.
    /// Emits `SignedOut` only if a session existed.
    async fn clear(&self) -> Option<Session> {
        let dropped = self.session.write().await.take();
        if let Some(store) = &self.store {
            if let Err(e) = store.remove().await {
                warn!(error = %e, "failed to remove persisted session");
            }
        }
        if dropped.is_some() {
            let _ = self.events.send(AuthChange::signed_out());
        }
        dropped
    }

    async fn refresh(&self, current: &Session) -> Result<Session, BackendError> {
        let body = self
            .post(
                "/token?grant_type=refresh_token",
                None,
                &json!({ "refresh_token": current.refresh_token }),
            )
            .await?;
        parse_session(&body, now_unix())
    }
}

#[async_trait::async_trait]
impl AuthProvider for RemoteAuth {
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        let Some(session) = self.session.read().await.clone() else {
            return Ok(None);
        };
        if !session.expires_within(now_unix(), REFRESH_MARGIN_SECS) {
            return Ok(Some(session));
        }

        debug!(principal = %session.principal(), "session near expiry; refreshing");
        match self.refresh(&session).await {
            Ok(fresh) => {
                self.install(fresh.clone(), AuthEvent::TokenRefreshed).await;
                Ok(Some(fresh))
            }
            Err(e) if e.retryable() => Err(e),
            Err(e) => {
                warn!(error = %e, "session refresh rejected; signing out locally");
                self.clear().await;
                Ok(None)
            }
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let body = self
            .post("/token?grant_type=password", None, &json!({ "email": email, "password": password }))
            .await?;
        let session = parse_session(&body, now_unix())?;
        info!(principal = %session.principal(), "signed in");
        self.install(session.clone(), AuthEvent::SignedIn).await;
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, profile: &ProfileAttrs) -> Result<Session, BackendError> {
        let body = self
            .post("/signup", None, &json!({ "email": email, "password": password, "data": profile }))
            .await?;
        let session = parse_signup(&body, now_unix())?;
        info!(principal = %session.principal(), "signed up");
        self.install(session.clone(), AuthEvent::SignedIn).await;
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        // Local state goes first: a caller may drop this future while the
        // remote logout is still in flight.
        let Some(dropped) = self.clear().await else {
            return Ok(());
        };
        info!("signed out");
        if let Err(e) = self.post("/logout", Some(&dropped.access_token), &json!({})).await {
            warn!(error = %e, "remote sign-out failed; local session already cleared");
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

// =============================================================================
// WIRE PARSING
// =============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

/// Parse a token grant response. `expires_at` wins over `expires_in`.
pub(crate) fn parse_session(body: &str, now: i64) -> Result<Session, BackendError> {
    let token: TokenResponse = serde_json::from_str(body).map_err(|e| BackendError::Parse(e.to_string()))?;
    Ok(session_from(token, now))
}

/// Parse a sign-up response. Without an access token the account awaits
/// email confirmation and no session exists yet.
pub(crate) fn parse_signup(body: &str, now: i64) -> Result<Session, BackendError> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| BackendError::Parse(e.to_string()))?;
    if value.get("access_token").is_none_or(serde_json::Value::is_null) {
        return Err(BackendError::ConfirmationPending);
    }
    let token: TokenResponse = serde_json::from_value(value).map_err(|e| BackendError::Parse(e.to_string()))?;
    Ok(session_from(token, now))
}

fn session_from(token: TokenResponse, now: i64) -> Session {
    let expires_at = token
        .expires_at
        .unwrap_or_else(|| now + token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS));
    Session { access_token: token.access_token, refresh_token: token.refresh_token, expires_at, user: token.user }
}

// =============================================================================
// PERSISTENCE
// =============================================================================

/// JSON file holding the last issued session.
pub(crate) struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored session. Missing or unreadable files yield `None`.
    pub(crate) fn load(&self) -> Option<Session> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read session file");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring malformed session file");
                None
            }
        }
    }

    pub(crate) async fn save(&self, session: &Session) -> Result<(), BackendError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BackendError::SessionStore(e.to_string()))?;
        }
        let bytes = serde_json::to_vec(session).map_err(|e| BackendError::SessionStore(e.to_string()))?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| BackendError::SessionStore(e.to_string()))
    }

    pub(crate) async fn remove(&self) -> Result<(), BackendError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackendError::SessionStore(e.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
