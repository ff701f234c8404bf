//! Ensures every Discord login maps to an account in the panel

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::client::{CreateUserOutcome, NewPanelUser, SharedPanelApi};
use super::credentials::SharedCredentialSource;
use crate::error::{GatewayError, Result};
use crate::models::{email_key, user_key, ProvisionRequest, UserRecord};
use crate::state::SharedKvStore;

/// Lookup-or-create of panel accounts, keyed by email
pub struct AccountProvisioner {
    store: SharedKvStore,
    panel: SharedPanelApi,
    credentials: SharedCredentialSource,
    password_length: usize,

    /// One lock per email currently being provisioned
    email_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AccountProvisioner {
    pub fn new(
        store: SharedKvStore,
        panel: SharedPanelApi,
        credentials: SharedCredentialSource,
        password_length: usize,
    ) -> Self {
        Self {
            store,
            panel,
            credentials,
            password_length,
            email_locks: DashMap::new(),
        }
    }

    /// Return the panel account id for this email, creating the account if needed.
    ///
    /// The email index is consulted first and short-circuits the panel call.
    /// On a miss a new account is requested; if the panel reports that one
    /// already exists, its id is adopted and the index repaired. Any other
    /// panel or store failure is returned unchanged and nothing is written.
    pub async fn ensure_backing_account(&self, request: &ProvisionRequest) -> Result<String> {
        if let Some(account_id) = self.lookup_email(&request.email).await? {
            debug!("Email index hit for {}", request.email);
            self.refresh_user_record(request, &account_id).await;
            return Ok(account_id);
        }

        let lock = self
            .email_locks
            .entry(request.email.clone())
            .or_default()
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.provision_locked(request).await
        };

        drop(lock);
        self.email_locks
            .remove_if(&request.email, |_, l| Arc::strong_count(l) == 1);

        result
    }

    async fn provision_locked(&self, request: &ProvisionRequest) -> Result<String> {
        // Another login for the same email may have finished while we waited
        if let Some(account_id) = self.lookup_email(&request.email).await? {
            self.refresh_user_record(request, &account_id).await;
            return Ok(account_id);
        }

        let new_user = NewPanelUser {
            username: request.username.clone(),
            email: request.email.clone(),
            password: self.credentials.generate(self.password_length),
            user_id: request.external_id.clone(),
        };

        let account_id = match self.panel.create_user(&new_user).await? {
            CreateUserOutcome::Created { user_id } => {
                info!(
                    "Created panel account {} for {} ({})",
                    user_id, request.username, request.external_id
                );
                user_id
            }
            CreateUserOutcome::Conflict { user_id } => {
                warn!(
                    "Panel already has account {} for {}, repairing local index",
                    user_id, request.email
                );
                user_id
            }
        };

        let index_key = email_key(&request.email);
        self.store
            .set(&index_key, serde_json::Value::String(account_id.clone()))
            .await?;

        if let Err(e) = self
            .write_user_record(&UserRecord::new(request, &account_id))
            .await
        {
            // Index was empty before this call
            if let Err(undo) = self.store.remove(&index_key).await {
                error!("Failed to roll back email index for {}: {}", request.email, undo);
            }
            return Err(e);
        }

        Ok(account_id)
    }

    async fn lookup_email(&self, email: &str) -> Result<Option<String>> {
        match self.store.get(&email_key(email)).await? {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(id)) => Ok(Some(id)),
            Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(GatewayError::Store {
                message: format!("email index for {} holds {}", email, other),
            }),
        }
    }

    /// Best-effort sync on an index hit; the account id is already known
    async fn refresh_user_record(&self, request: &ProvisionRequest, account_id: &str) {
        if let Err(e) = self.sync_user_record(request, account_id).await {
            warn!(
                "Could not refresh user record for {} ({}): {}",
                request.username, request.external_id, e
            );
        }
    }

    /// Keep the user record in step with the latest Discord profile
    async fn sync_user_record(&self, request: &ProvisionRequest, account_id: &str) -> Result<()> {
        let key = user_key(&request.external_id);
        let existing = match self.store.get(&key).await? {
            Some(value) => Some(serde_json::from_value::<UserRecord>(value).map_err(|e| {
                GatewayError::Store {
                    message: format!("unreadable user record {}: {}", key, e),
                }
            })?),
            None => None,
        };

        match existing {
            Some(record) if record.matches(request, account_id) => Ok(()),
            _ => {
                self.write_user_record(&UserRecord::new(request, account_id))
                    .await
            }
        }
    }

    async fn write_user_record(&self, record: &UserRecord) -> Result<()> {
        self.store
            .set(
                &user_key(&record.external_id),
                serde_json::to_value(record)?,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::kv_store::KvStore;
    use crate::state::MemoryStore;
    use crate::test_support::{FakePanel, SequentialCredentials, UserWriteFailingStore};
    use serde_json::json;

    fn request(email: &str, external_id: &str) -> ProvisionRequest {
        ProvisionRequest {
            external_id: external_id.to_string(),
            username: "nelly".to_string(),
            email: email.to_string(),
        }
    }

    fn provisioner(
        store: Arc<MemoryStore>,
        panel: Arc<FakePanel>,
    ) -> AccountProvisioner {
        AccountProvisioner::new(store, panel, Arc::new(SequentialCredentials::default()), 12)
    }

    #[tokio::test]
    async fn test_create_then_fast_path() {
        let store = Arc::new(MemoryStore::new());
        let panel = Arc::new(FakePanel::created("42"));
        let provisioner = provisioner(store.clone(), panel.clone());

        let first = provisioner
            .ensure_backing_account(&request("a@x.com", "1"))
            .await
            .unwrap();
        assert_eq!(first, "42");
        assert_eq!(panel.calls(), 1);

        let second = provisioner
            .ensure_backing_account(&request("a@x.com", "1"))
            .await
            .unwrap();
        assert_eq!(second, "42");
        assert_eq!(panel.calls(), 1);

        assert_eq!(store.get("id-a@x.com").await.unwrap(), Some(json!("42")));
        let record: UserRecord =
            serde_json::from_value(store.get("user-1").await.unwrap().unwrap()).unwrap();
        assert_eq!(record.backing_account_id, "42");
        assert_eq!(record.email, "a@x.com");
    }

    #[tokio::test]
    async fn test_conflict_repairs_index() {
        let store = Arc::new(MemoryStore::new());
        let panel = Arc::new(FakePanel::conflict("7"));
        let provisioner = provisioner(store.clone(), panel.clone());

        let id = provisioner
            .ensure_backing_account(&request("b@x.com", "2"))
            .await
            .unwrap();
        assert_eq!(id, "7");
        assert_eq!(store.get("id-b@x.com").await.unwrap(), Some(json!("7")));

        // Third call goes straight to the index
        let again = provisioner
            .ensure_backing_account(&request("b@x.com", "2"))
            .await
            .unwrap();
        assert_eq!(again, "7");
        assert_eq!(panel.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let panel = Arc::new(FakePanel::failing(500));
        let provisioner = provisioner(store.clone(), panel.clone());

        let result = provisioner
            .ensure_backing_account(&request("c@x.com", "3"))
            .await;
        assert!(matches!(
            result,
            Err(GatewayError::Provisioning { status: 500, .. })
        ));
        assert!(store.get("id-c@x.com").await.unwrap().is_none());
        assert!(store.get("user-3").await.unwrap().is_none());
        assert!(provisioner.email_locks.is_empty());
    }

    #[tokio::test]
    async fn test_credentials_sent_and_not_reused() {
        let store = Arc::new(MemoryStore::new());
        let panel = Arc::new(FakePanel::created("42"));
        let provisioner = provisioner(store, panel.clone());

        provisioner
            .ensure_backing_account(&request("a@x.com", "1"))
            .await
            .unwrap();
        provisioner
            .ensure_backing_account(&request("d@x.com", "4"))
            .await
            .unwrap();

        let requests = panel.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].password.len(), 12);
        assert!(requests[0].password.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(requests[0].password, requests[1].password);
        assert_eq!(requests[0].user_id, "1");
        assert_eq!(requests[1].email, "d@x.com");
    }

    #[tokio::test]
    async fn test_shared_email_gets_user_record() {
        let store = Arc::new(MemoryStore::new());
        let panel = Arc::new(FakePanel::created("42"));
        let provisioner = provisioner(store.clone(), panel.clone());

        provisioner
            .ensure_backing_account(&request("a@x.com", "1"))
            .await
            .unwrap();
        // A second Discord account with the same email reuses the panel account
        let id = provisioner
            .ensure_backing_account(&request("a@x.com", "5"))
            .await
            .unwrap();

        assert_eq!(id, "42");
        assert_eq!(panel.calls(), 1);
        let record: UserRecord =
            serde_json::from_value(store.get("user-5").await.unwrap().unwrap()).unwrap();
        assert_eq!(record.backing_account_id, "42");
    }

    #[tokio::test]
    async fn test_relogin_refreshes_username() {
        let store = Arc::new(MemoryStore::new());
        let panel = Arc::new(FakePanel::created("42"));
        let provisioner = provisioner(store.clone(), panel.clone());

        provisioner
            .ensure_backing_account(&request("a@x.com", "1"))
            .await
            .unwrap();

        let mut renamed = request("a@x.com", "1");
        renamed.username = "nelly2".to_string();
        provisioner.ensure_backing_account(&renamed).await.unwrap();

        let record: UserRecord =
            serde_json::from_value(store.get("user-1").await.unwrap().unwrap()).unwrap();
        assert_eq!(record.username, "nelly2");
        assert_eq!(panel.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_logins_create_once() {
        let store = Arc::new(MemoryStore::new());
        let panel = Arc::new(FakePanel::created("42").with_delay_ms(50));
        let provisioner = Arc::new(provisioner(store, panel.clone()));

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let provisioner = provisioner.clone();
                tokio::spawn(async move {
                    provisioner
                        .ensure_backing_account(&request("e@x.com", &format!("{}", 10 + i)))
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "42");
        }
        assert_eq!(panel.calls(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_index_entry_is_error() {
        let store = Arc::new(MemoryStore::new());
        store.set("id-a@x.com", json!({"weird": true})).await.unwrap();
        let panel = Arc::new(FakePanel::created("42"));
        let provisioner = provisioner(store, panel.clone());

        let result = provisioner
            .ensure_backing_account(&request("a@x.com", "1"))
            .await;
        assert!(matches!(result, Err(GatewayError::Store { .. })));
        assert_eq!(panel.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_user_record_write_rolls_back_index() {
        let store = Arc::new(UserWriteFailingStore::new());
        let panel = Arc::new(FakePanel::created("42"));
        let provisioner = AccountProvisioner::new(
            store.clone(),
            panel.clone(),
            Arc::new(SequentialCredentials::default()),
            12,
        );

        let result = provisioner
            .ensure_backing_account(&request("a@x.com", "1"))
            .await;
        assert!(matches!(result, Err(GatewayError::Store { .. })));
        assert_eq!(panel.calls(), 1);
        assert!(store.get("id-a@x.com").await.unwrap().is_none());
        assert!(store.get("user-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_index_hit_survives_user_record_write_failure() {
        let store = Arc::new(UserWriteFailingStore::new());
        store.set("id-a@x.com", json!("42")).await.unwrap();
        let panel = Arc::new(FakePanel::created("99"));
        let provisioner = AccountProvisioner::new(
            store.clone(),
            panel.clone(),
            Arc::new(SequentialCredentials::default()),
            12,
        );

        let id = provisioner
            .ensure_backing_account(&request("a@x.com", "1"))
            .await
            .unwrap();
        assert_eq!(id, "42");
        assert_eq!(panel.calls(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_user_record_is_not_overwritten() {
        let store = Arc::new(MemoryStore::new());
        store.set("id-a@x.com", json!("42")).await.unwrap();
        store.set("user-1", json!("garbage")).await.unwrap();
        let panel = Arc::new(FakePanel::created("42"));
        let provisioner = provisioner(store.clone(), panel.clone());

        let request = request("a@x.com", "1");
        assert!(matches!(
            provisioner.sync_user_record(&request, "42").await,
            Err(GatewayError::Store { .. })
        ));

        // Login still resolves through the index and leaves the record for inspection
        let id = provisioner.ensure_backing_account(&request).await.unwrap();
        assert_eq!(id, "42");
        assert_eq!(store.get("user-1").await.unwrap(), Some(json!("garbage")));
    }
}
