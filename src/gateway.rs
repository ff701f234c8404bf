//! Discord login flow for the panel
//!
//! `AuthGateway` ties the pieces together:
//! - `begin_login` remembers where to go afterwards and sends the browser to Discord
//! - `complete_login` verifies what Discord sent back, makes sure a panel
//!   account exists and signs the session in
//! - `logout` destroys the session
//!
//! It knows nothing about axum; handlers in `web::server` translate its
//! `Redirection`s into responses.

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{GatewayError, Result};
use crate::logging::SharedLogSink;
use crate::models::{user_key, Identity, UserRecord};
use crate::provisioning::AccountProvisioner;
use crate::state::SharedKvStore;
use crate::web::oauth::SharedIdentityProvider;
use crate::web::session::{
    create_logout_cookie, create_session_cookie, SessionData, SharedSessionStore,
};

/// Opaque error codes appended to the login page URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailure {
    DiscordAuthFailed,
    AccountSetupFailed,
}

impl LoginFailure {
    pub fn code(&self) -> &'static str {
        match self {
            LoginFailure::DiscordAuthFailed => "discord_auth_failed",
            LoginFailure::AccountSetupFailed => "account_setup_failed",
        }
    }

    pub fn redirect_path(&self) -> String {
        format!("/login?error={}", self.code())
    }
}

/// Query parameters Discord appends to the callback URL
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set when the user denied consent
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Where to send the browser, plus a cookie to set on the way
#[derive(Debug, Clone, PartialEq)]
pub struct Redirection {
    pub location: String,
    pub set_cookie: Option<String>,
}

impl Redirection {
    fn to(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            set_cookie: None,
        }
    }

    fn with_cookie(mut self, cookie: String) -> Self {
        self.set_cookie = Some(cookie);
        self
    }
}

pub struct AuthGateway {
    provider: SharedIdentityProvider,
    provisioner: AccountProvisioner,
    store: SharedKvStore,
    sessions: SharedSessionStore,
    log_sink: SharedLogSink,
    default_return_to: String,
}

impl AuthGateway {
    pub fn new(
        provider: SharedIdentityProvider,
        provisioner: AccountProvisioner,
        store: SharedKvStore,
        sessions: SharedSessionStore,
        log_sink: SharedLogSink,
        default_return_to: String,
    ) -> Self {
        Self {
            provider,
            provisioner,
            store,
            sessions,
            log_sink,
            default_return_to,
        }
    }

    /// GET /login/discord
    pub fn begin_login(&self, session_token: Option<&str>, return_to: Option<&str>) -> Redirection {
        let return_to = sanitize_return_to(return_to, &self.default_return_to);
        let oauth_state = uuid::Uuid::new_v4().to_string();

        let location = self.provider.authorize_url(&oauth_state);

        let updated = session_token
            .map(|token| {
                self.sessions.update(token, |s| {
                    s.return_to = Some(return_to.clone());
                    s.oauth_state = Some(oauth_state.clone());
                })
            })
            .unwrap_or(false);

        if updated {
            return Redirection::to(location);
        }

        let mut session = SessionData::new();
        session.return_to = Some(return_to);
        session.oauth_state = Some(oauth_state);
        let token = self.sessions.create(session);

        Redirection::to(location).with_cookie(create_session_cookie(&token))
    }

    /// GET /callback/discord
    pub async fn complete_login(
        &self,
        session_token: Option<&str>,
        params: CallbackParams,
    ) -> Redirection {
        let Some(token) = session_token else {
            warn!("OAuth callback without a session cookie");
            return LoginFailure::DiscordAuthFailed.into();
        };

        // The CSRF state is single use
        let mut pending = None;
        self.sessions.update(token, |s| {
            pending = Some((s.oauth_state.take(), s.return_to.clone()));
        });
        let Some((expected_state, return_to)) = pending else {
            warn!("OAuth callback for an unknown or expired session");
            return LoginFailure::DiscordAuthFailed.into();
        };

        match self.verify_and_provision(&params, expected_state.as_deref()).await {
            Ok(record) => {
                // Rotate the session id on login
                self.sessions.destroy(token);
                let mut session = SessionData::new();
                session.user_id = Some(self.to_session_token(&record));
                let new_token = self.sessions.create(session);

                info!(
                    "User {} ({}) logged in, panel account {}",
                    record.username, record.external_id, record.backing_account_id
                );

                let location = return_to.unwrap_or_else(|| self.default_return_to.clone());
                Redirection::to(location).with_cookie(create_session_cookie(&new_token))
            }
            Err(failure) => {
                self.sessions.update(token, |s| s.user_id = None);
                failure.into()
            }
        }
    }

    async fn verify_and_provision(
        &self,
        params: &CallbackParams,
        expected_state: Option<&str>,
    ) -> std::result::Result<UserRecord, LoginFailure> {
        if let Some(error) = &params.error {
            warn!(
                "Discord returned an error: {} ({})",
                error,
                params.error_description.as_deref().unwrap_or("no description")
            );
            return Err(LoginFailure::DiscordAuthFailed);
        }

        match (expected_state, params.state.as_deref()) {
            (Some(expected), Some(got)) if expected == got => {}
            _ => {
                warn!("OAuth state mismatch");
                return Err(LoginFailure::DiscordAuthFailed);
            }
        }

        let Some(code) = params.code.as_deref() else {
            warn!("OAuth callback without a code");
            return Err(LoginFailure::DiscordAuthFailed);
        };

        let profile = self.provider.authenticate(code).await.map_err(|e| {
            warn!("Discord authentication failed: {}", e);
            LoginFailure::DiscordAuthFailed
        })?;

        let request = Identity::from(profile)
            .into_provision_request()
            .map_err(|e| self.setup_failed(e))?;

        let account_id = self
            .provisioner
            .ensure_backing_account(&request)
            .await
            .map_err(|e| self.setup_failed(e))?;

        Ok(UserRecord::new(&request, &account_id))
    }

    fn setup_failed(&self, error: GatewayError) -> LoginFailure {
        self.log_sink.log_error("Auth callback failed", &error);
        LoginFailure::AccountSetupFailed
    }

    /// GET /logout
    pub fn logout(&self, session_token: Option<&str>) -> Redirection {
        if let Some(token) = session_token {
            if let Some(session) = self.sessions.destroy(token) {
                if let Some(user_id) = session.user_id {
                    info!("User {} logged out", user_id);
                }
            }
        }
        Redirection::to("/").with_cookie(create_logout_cookie())
    }

    /// What the session remembers about a user
    pub fn to_session_token(&self, user: &UserRecord) -> String {
        user.external_id.clone()
    }

    /// Resolve a session's user id back into the stored record
    pub async fn from_session_token(&self, external_id: &str) -> Result<Option<UserRecord>> {
        match self.store.get(&user_key(external_id)).await? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| GatewayError::Store {
                    message: format!("unreadable user record for {}: {}", external_id, e),
                }),
        }
    }

    /// The logged-in user behind a session cookie, if any
    pub async fn current_user(&self, session_token: Option<&str>) -> Result<Option<UserRecord>> {
        let user_id = session_token
            .and_then(|token| self.sessions.get(token))
            .and_then(|s| s.user_id);

        match user_id {
            Some(id) => self.from_session_token(&id).await,
            None => Ok(None),
        }
    }
}

impl From<LoginFailure> for Redirection {
    fn from(failure: LoginFailure) -> Self {
        Redirection::to(failure.redirect_path())
    }
}

/// Only same-site paths are accepted as post-login destinations
pub fn sanitize_return_to(return_to: Option<&str>, default: &str) -> String {
    match return_to {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.starts_with("/\\")
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => default.to_string(),
    }
}
