//! Panel account-provisioning API

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::config::PanelConfig;
use crate::error::{GatewayError, Result};

/// Body of `POST /api/auth/create-user`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPanelUser {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Discord id of the user the account belongs to
    pub user_id: String,
}

/// What the panel said about a create-user call
#[derive(Debug, Clone, PartialEq)]
pub enum CreateUserOutcome {
    Created { user_id: String },
    /// An account for this email already exists
    Conflict { user_id: String },
}

#[async_trait]
pub trait PanelApi: Send + Sync {
    async fn create_user(&self, user: &NewPanelUser) -> Result<CreateUserOutcome>;
}

pub type SharedPanelApi = Arc<dyn PanelApi>;

/// reqwest-backed panel client
#[derive(Clone)]
pub struct HttpPanelClient {
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl HttpPanelClient {
    pub fn new(config: &PanelConfig, http_client: reqwest::Client) -> Self {
        Self {
            base_url: config.url.clone(),
            api_key: config.api_key.clone(),
            http_client,
        }
    }

    fn create_user_url(&self) -> String {
        format!("{}/api/auth/create-user", self.base_url)
    }
}

#[async_trait]
impl PanelApi for HttpPanelClient {
    async fn create_user(&self, user: &NewPanelUser) -> Result<CreateUserOutcome> {
        debug!("Creating panel account for {}", user.email);

        let response = self
            .http_client
            .post(self.create_user_url())
            .header("x-api-key", &self.api_key)
            .json(user)
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::CONFLICT {
            let body: Value = response.json().await?;
            let user_id = extract_user_id(&body).ok_or_else(|| GatewayError::Provisioning {
                status: status.as_u16(),
                message: "conflict response carried no userId".to_string(),
            })?;
            return Ok(CreateUserOutcome::Conflict { user_id });
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Provisioning {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let body: Value = response.json().await?;
        let user_id = extract_user_id(&body).ok_or_else(|| GatewayError::Provisioning {
            status: status.as_u16(),
            message: "response carried no userId".to_string(),
        })?;

        Ok(CreateUserOutcome::Created { user_id })
    }
}

/// The panel sends `userId` as either a string or a number
fn extract_user_id(body: &Value) -> Option<String> {
    match body.get("userId")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
