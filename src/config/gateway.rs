use crate::error::{GatewayError, Result};

/// Length of generated panel passwords when PASSWORD_LENGTH is unset or invalid
pub const DEFAULT_PASSWORD_LENGTH: usize = 12;

/// Where users land after login when no returnTo was captured
pub const DEFAULT_RETURN_TO: &str = "/dashboard";

/// Discord application credentials
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Must match a redirect registered in the Discord Developer Portal
    pub callback_url: String,
}

/// Panel provisioning API settings
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Base URL without trailing slash
    pub url: String,
    pub api_key: String,
    pub password_length: usize,
}

/// Everything the login gateway needs from the environment
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub discord: DiscordConfig,
    pub panel: PanelConfig,
    pub default_return_to: String,
}

impl GatewayConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup (environment, test map, ...)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| GatewayError::ConfigMissing {
                    key: key.to_string(),
                })
        };

        let discord = DiscordConfig {
            client_id: required("DISCORD_CLIENT_ID")?,
            client_secret: required("DISCORD_CLIENT_SECRET")?,
            callback_url: required("DISCORD_CALLBACK_URL")?,
        };

        let panel = PanelConfig {
            url: normalize_base_url(&required("PANEL_URL")?),
            api_key: required("PANEL_KEY")?,
            password_length: parse_password_length(lookup("PASSWORD_LENGTH").as_deref()),
        };

        let default_return_to = lookup("DEFAULT_RETURN_TO")
            .filter(|v| v.starts_with('/'))
            .unwrap_or_else(|| DEFAULT_RETURN_TO.to_string());

        let config = Self {
            discord,
            panel,
            default_return_to,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.panel.url.starts_with("http://") && !self.panel.url.starts_with("https://") {
            return Err(GatewayError::ConfigValidation {
                message: format!("PANEL_URL must be an http(s) URL, got '{}'", self.panel.url),
            });
        }
        if !self.discord.callback_url.starts_with("http://")
            && !self.discord.callback_url.starts_with("https://")
        {
            return Err(GatewayError::ConfigValidation {
                message: format!(
                    "DISCORD_CALLBACK_URL must be an http(s) URL, got '{}'",
                    self.discord.callback_url
                ),
            });
        }
        Ok(())
    }
}

/// Strip a single trailing slash so paths can be appended with `format!`
fn normalize_base_url(url: &str) -> String {
    url.strip_suffix('/').unwrap_or(url).to_string()
}

fn parse_password_length(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|len| *len > 0)
        .unwrap_or(DEFAULT_PASSWORD_LENGTH)
}
