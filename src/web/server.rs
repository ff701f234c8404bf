//! Web server for the Discord login flow

use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use serde::Deserialize;
use serde_json::json;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::pages::login_page;
use super::session::get_session_token;
use crate::gateway::{AuthGateway, CallbackParams, Redirection};

/// Web server configuration
pub struct WebServerConfig {
    pub port: u16,
    /// Certificate and private key PEM files; plain HTTP when unset
    pub tls: Option<(PathBuf, PathBuf)>,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            tls: None,
        }
    }
}

impl WebServerConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let cert = std::env::var("TLS_CERT_PATH").ok().map(PathBuf::from);
        let key = std::env::var("TLS_KEY_PATH").ok().map(PathBuf::from);

        Self {
            port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3000),
            tls: cert.zip(key),
        }
    }
}

/// Shared state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<AuthGateway>,
}

#[derive(Deserialize)]
pub struct LoginParams {
    #[serde(rename = "returnTo")]
    return_to: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginPageParams {
    error: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/login", get(login))
        .route("/login/discord", get(login_discord))
        .route("/callback/discord", get(callback_discord))
        .route("/logout", get(logout))
        .route("/api/session", get(current_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server
pub async fn start_web_server(config: WebServerConfig, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    match config.tls {
        Some((cert_path, key_path)) => {
            info!("Loading TLS certificates:");
            info!("  Certificate: {}", cert_path.display());
            info!("  Private key: {}", key_path.display());

            if !cert_path.exists() {
                return Err(anyhow::anyhow!(
                    "Certificate file not found: {}",
                    cert_path.display()
                ));
            }
            if !key_path.exists() {
                return Err(anyhow::anyhow!(
                    "Private key file not found: {}",
                    key_path.display()
                ));
            }

            let tls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
                .await
                .map_err(|e| anyhow::anyhow!(
                    "Failed to load TLS certificates: {}\n  Certificate: {}\n  Private key: {}\n\nHint: The private key must be in PKCS#8 PEM format.",
                    e, cert_path.display(), key_path.display()
                ))?;

            info!("Web server listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("Web server listening on http://{}", listener.local_addr()?);
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

impl IntoResponse for Redirection {
    fn into_response(self) -> Response {
        let mut response = Redirect::to(&self.location).into_response();
        if let Some(cookie) = self.set_cookie {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    response.headers_mut().insert(SET_COOKIE, value);
                }
                Err(e) => error!("Refusing to send malformed cookie: {}", e),
            }
        }
        response
    }
}

/// Health check endpoint
async fn health() -> &'static str {
    "Panel Login Server Running"
}

/// GET /login - Show login page
async fn login(Query(params): Query<LoginPageParams>) -> Html<String> {
    Html(login_page(params.error.as_deref()))
}

/// GET /login/discord?returnTo=... - Start the Discord OAuth flow
async fn login_discord(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<LoginParams>,
) -> Redirection {
    let token = get_session_token(&headers);
    state
        .gateway
        .begin_login(token.as_deref(), params.return_to.as_deref())
}

/// GET /callback/discord - OAuth callback handler
async fn callback_discord(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Redirection {
    let token = get_session_token(&headers);
    state.gateway.complete_login(token.as_deref(), params).await
}

/// GET /logout - Clear session and redirect home
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Redirection {
    let token = get_session_token(&headers);
    state.gateway.logout(token.as_deref())
}

/// GET /api/session - The logged-in user, for the panel frontend
async fn current_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = get_session_token(&headers);
    match state.gateway.current_user(token.as_deref()).await {
        Ok(Some(user)) => Json(user).into_response(),
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "not_authenticated"})),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to load session user: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal_error"})),
            )
                .into_response()
        }
    }
}
