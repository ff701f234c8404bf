//! Doubles shared by unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{GatewayError, Result};
use crate::logging::LogSink;
use crate::models::DiscordProfile;
use crate::provisioning::client::{CreateUserOutcome, NewPanelUser, PanelApi};
use crate::provisioning::credentials::CredentialSource;
use crate::state::kv_store::KvStore;
use crate::state::MemoryStore;
use crate::web::oauth::IdentityProvider;

enum PanelReply {
    Created(String),
    Conflict(String),
    Fail(u16),
}

/// Panel that answers every create-user call the same way and records requests
pub struct FakePanel {
    reply: PanelReply,
    delay: Option<Duration>,
    requests: Mutex<Vec<NewPanelUser>>,
}

impl FakePanel {
    fn new(reply: PanelReply) -> Self {
        Self {
            reply,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn created(user_id: &str) -> Self {
        Self::new(PanelReply::Created(user_id.to_string()))
    }

    pub fn conflict(user_id: &str) -> Self {
        Self::new(PanelReply::Conflict(user_id.to_string()))
    }

    pub fn failing(status: u16) -> Self {
        Self::new(PanelReply::Fail(status))
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Some(Duration::from_millis(ms));
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<NewPanelUser> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl PanelApi for FakePanel {
    async fn create_user(&self, user: &NewPanelUser) -> Result<CreateUserOutcome> {
        self.requests.lock().push(user.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reply {
            PanelReply::Created(id) => Ok(CreateUserOutcome::Created {
                user_id: id.clone(),
            }),
            PanelReply::Conflict(id) => Ok(CreateUserOutcome::Conflict {
                user_id: id.clone(),
            }),
            PanelReply::Fail(status) => Err(GatewayError::Provisioning {
                status: *status,
                message: "fake panel failure".to_string(),
            }),
        }
    }
}

/// Deterministic credentials: distinct per call, alphanumeric, exact length
#[derive(Default)]
pub struct SequentialCredentials {
    counter: AtomicUsize,
}

impl CredentialSource for SequentialCredentials {
    fn generate(&self, length: usize) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let padded = format!("{:0>width$}", n, width = length);
        padded[padded.len() - length..].to_string()
    }
}

/// Discord stand-in returning a fixed profile
pub struct FakeProvider {
    profile: Option<DiscordProfile>,
}

impl FakeProvider {
    pub fn with_email(email: &str) -> Self {
        Self {
            profile: Some(DiscordProfile {
                id: "1".to_string(),
                username: "nelly".to_string(),
                email: Some(email.to_string()),
            }),
        }
    }

    pub fn without_email() -> Self {
        Self {
            profile: Some(DiscordProfile {
                id: "1".to_string(),
                username: "nelly".to_string(),
                email: None,
            }),
        }
    }

    pub fn failing() -> Self {
        Self { profile: None }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorize_url(&self, state: &str) -> String {
        format!("https://discord.test/authorize?scope=identify%20email&state={}", state)
    }

    async fn authenticate(&self, _code: &str) -> Result<DiscordProfile> {
        self.profile.clone().ok_or_else(|| GatewayError::ProviderAuth {
            message: "fake provider rejected the code".to_string(),
        })
    }
}

/// Log sink that remembers messages
#[derive(Default)]
pub struct RecordingLogSink {
    entries: Mutex<Vec<(String, String)>>,
}

impl RecordingLogSink {
    pub fn messages(&self) -> Vec<String> {
        self.entries.lock().iter().map(|(m, _)| m.clone()).collect()
    }
}

impl LogSink for RecordingLogSink {
    fn log_error(&self, message: &str, error: &dyn std::error::Error) {
        self.entries
            .lock()
            .push((message.to_string(), error.to_string()));
    }
}

/// Store whose every operation fails
pub struct UnreadableStore;

#[async_trait]
impl KvStore for UnreadableStore {
    async fn get(&self, _key: &str) -> Result<Option<Value>> {
        Err(GatewayError::Store {
            message: "store offline".to_string(),
        })
    }

    async fn set(&self, _key: &str, _value: Value) -> Result<()> {
        Err(GatewayError::Store {
            message: "store offline".to_string(),
        })
    }

    async fn remove(&self, _key: &str) -> Result<()> {
        Err(GatewayError::Store {
            message: "store offline".to_string(),
        })
    }
}

/// Memory store that refuses to write `user-*` records
#[derive(Default)]
pub struct UserWriteFailingStore {
    inner: MemoryStore,
}

impl UserWriteFailingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for UserWriteFailingStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        if key.starts_with("user-") {
            return Err(GatewayError::Store {
                message: "disk full".to_string(),
            });
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }
}
