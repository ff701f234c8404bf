//! Web server for Discord login
//!
//! Serves the login/callback/logout routes in front of `AuthGateway` and
//! keeps the server-side session store.

pub mod oauth;
mod pages;
mod server;
pub mod session;

pub use oauth::DiscordOAuth;
pub use server::{start_web_server, AppState, WebServerConfig};
pub use session::create_session_store;
