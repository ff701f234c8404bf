//! Server-side sessions addressed by an opaque cookie token

use axum::http::HeaderMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub const SESSION_COOKIE: &str = "panel_session";

/// Sessions live for 24 hours
const SESSION_TTL_SECS: i64 = 86400;

/// Everything we remember about a browser between requests
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    /// Discord id of the logged-in user, if any
    pub user_id: Option<String>,
    /// Where to send the user after login completes
    pub return_to: Option<String>,
    /// CSRF state sent to Discord with the authorize redirect
    pub oauth_state: Option<String>,
    pub expires_at: i64,
}

impl SessionData {
    pub fn new() -> Self {
        Self {
            expires_at: chrono::Utc::now().timestamp() + SESSION_TTL_SECS,
            ..Default::default()
        }
    }

    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() >= self.expires_at
    }
}

/// Session store - maps session tokens to session data
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionData>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new session and return the token
    pub fn create(&self, session: SessionData) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        self.sessions.write().insert(token.clone(), session);
        token
    }

    /// Get session by token (returns None if expired or not found)
    pub fn get(&self, token: &str) -> Option<SessionData> {
        self.sessions
            .read()
            .get(token)
            .filter(|s| !s.is_expired())
            .cloned()
    }

    /// Apply `f` to a live session. Returns false if there is none.
    pub fn update<F>(&self, token: &str, f: F) -> bool
    where
        F: FnOnce(&mut SessionData),
    {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(token) {
            Some(session) if !session.is_expired() => {
                f(session);
                true
            }
            _ => false,
        }
    }

    /// Remove a session, returning what it held
    pub fn destroy(&self, token: &str) -> Option<SessionData> {
        self.sessions.write().remove(token)
    }

    /// Clean up expired sessions
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        before - sessions.len()
    }
}

pub type SharedSessionStore = Arc<SessionStore>;

pub fn create_session_store() -> SharedSessionStore {
    Arc::new(SessionStore::new())
}

/// Extract session token from cookies
pub fn get_session_token(headers: &HeaderMap) -> Option<String> {
    let prefix = format!("{}=", SESSION_COOKIE);
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|cookie| {
            cookie
                .trim()
                .strip_prefix(prefix.as_str())
                .filter(|token| !token.is_empty())
                .map(str::to_string)
        })
}

/// Create a session cookie
pub fn create_session_cookie(token: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, SESSION_TTL_SECS
    )
}

/// Create a logout cookie (clears the session)
pub fn create_logout_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}
