//! Discord OAuth2 code flow

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::DiscordConfig;
use crate::error::{GatewayError, Result};
use crate::models::DiscordProfile;

const DISCORD_AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";
const DISCORD_API_URL: &str = "https://discord.com/api";

/// Scopes needed to read the user's id, name and email
pub const SCOPES: &[&str] = &["identify", "email"];

/// Something that can turn an authorization code into a user profile
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL to send the browser to, carrying `state` for CSRF protection
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange the callback code and fetch the user behind it
    async fn authenticate(&self, code: &str) -> Result<DiscordProfile>;
}

pub type SharedIdentityProvider = Arc<dyn IdentityProvider>;

/// Discord OAuth token response
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// OAuth configuration
#[derive(Clone)]
pub struct DiscordOAuth {
    pub config: DiscordConfig,
    pub api_url: String,
    pub http_client: reqwest::Client,
}

impl DiscordOAuth {
    pub fn new(config: DiscordConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            api_url: DISCORD_API_URL.to_string(),
            http_client,
        }
    }

    /// Point API calls somewhere other than discord.com
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        let response = self
            .http_client
            .post(format!("{}/oauth2/token", self.api_url))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.callback_url.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                error!("Failed to exchange code: {}", e);
                provider_error("failed to exchange authorization code")
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Token exchange failed: {}", error_text);
            return Err(provider_error("token exchange failed"));
        }

        response.json().await.map_err(|e| {
            error!("Failed to parse token response: {}", e);
            provider_error("failed to parse token response")
        })
    }

    async fn fetch_profile(&self, token: &TokenResponse) -> Result<DiscordProfile> {
        let response = self
            .http_client
            .get(format!("{}/users/@me", self.api_url))
            .header(
                "Authorization",
                format!("{} {}", token.token_type, token.access_token),
            )
            .send()
            .await
            .map_err(|e| {
                error!("Failed to get user info: {}", e);
                provider_error("failed to get user info")
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("User info request failed: {}", error_text);
            return Err(provider_error("failed to get user info"));
        }

        response.json().await.map_err(|e| {
            error!("Failed to parse user info: {}", e);
            provider_error("failed to parse user info")
        })
    }
}

#[async_trait]
impl IdentityProvider for DiscordOAuth {
    fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            DISCORD_AUTHORIZE_URL,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.callback_url),
            urlencoding::encode(&SCOPES.join(" ")),
            urlencoding::encode(state)
        )
    }

    async fn authenticate(&self, code: &str) -> Result<DiscordProfile> {
        let token = self.exchange_code(code).await?;
        debug!("Got access token, fetching user info...");
        self.fetch_profile(&token).await
    }
}

fn provider_error(message: &str) -> GatewayError {
    GatewayError::ProviderAuth {
        message: message.to_string(),
    }
}
