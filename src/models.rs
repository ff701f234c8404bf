// src/models.rs
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Discord user info from /users/@me (with the `email` scope)
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Who Discord says the user is. Only lives for the duration of a callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub external_id: String,
    pub username: String,
    pub email: Option<String>,
}

impl From<DiscordProfile> for Identity {
    fn from(profile: DiscordProfile) -> Self {
        Self {
            external_id: profile.id,
            username: profile.username,
            email: profile.email,
        }
    }
}

impl Identity {
    /// An email is required to create a panel account
    pub fn into_provision_request(self) -> Result<ProvisionRequest> {
        match self.email.filter(|e| !e.trim().is_empty()) {
            Some(email) => Ok(ProvisionRequest {
                external_id: self.external_id,
                username: self.username,
                email,
            }),
            None => Err(GatewayError::MissingEmail {
                external_id: self.external_id,
            }),
        }
    }
}

/// An identity that is known to carry an email
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionRequest {
    pub external_id: String,
    pub username: String,
    pub email: String,
}

/// Local user persisted under `user-<discord id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Discord user ID (snowflake as string)
    #[serde(rename = "id")]
    pub external_id: String,

    pub email: String,

    pub username: String,

    /// Account id in the panel
    #[serde(rename = "panelId", alias = "hydraId")]
    pub backing_account_id: String,
}

impl UserRecord {
    pub fn new(request: &ProvisionRequest, backing_account_id: &str) -> Self {
        Self {
            external_id: request.external_id.clone(),
            email: request.email.clone(),
            username: request.username.clone(),
            backing_account_id: backing_account_id.to_string(),
        }
    }

    /// Whether this record still matches what Discord and the panel report
    pub fn matches(&self, request: &ProvisionRequest, backing_account_id: &str) -> bool {
        self.email == request.email
            && self.username == request.username
            && self.backing_account_id == backing_account_id
    }
}

/// Store key for a user record
pub fn user_key(external_id: &str) -> String {
    format!("user-{}", external_id)
}

/// Store key for the email -> panel account index
pub fn email_key(email: &str) -> String {
    format!("id-{}", email)
}
