//! Staff accounts service

use std::sync::Arc;

use tracing::{error, info};

use crate::domain::{Account, AccountUpdate, NewAccount};
use crate::storage::{AccountStore, StorageResult};

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn AccountStore>,
}

impl AccountService {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> StorageResult<Vec<Account>> {
        self.store.list_accounts().await.map_err(|e| {
            error!(error = %e, "Failed to list accounts");
            e
        })
    }

    pub async fn create(&self, account: &NewAccount) -> StorageResult<Account> {
        let created = self.store.create_account(account).await.map_err(|e| {
            error!(error = %e, usuario = %account.usuario, "Failed to create account");
            e
        })?;
        info!(id = %created.id, usuario = %created.usuario, "Account created");
        Ok(created)
    }

    pub async fn update(&self, id: &str, update: &AccountUpdate) -> StorageResult<Option<Account>> {
        self.store.update_account(id, update).await.map_err(|e| {
            error!(error = %e, id, "Failed to update account");
            e
        })
    }

    /// Removes any account, the administrator included; callers guard that one
    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        self.store.delete_account(id).await.map_err(|e| {
            error!(error = %e, id, "Failed to delete account");
            e
        })
    }

    pub async fn validate_credentials(
        &self,
        user_or_email: &str,
        password: &str,
    ) -> StorageResult<Option<Account>> {
        self.store
            .validate_credentials(user_or_email.trim(), password)
            .await
            .map_err(|e| {
                error!(error = %e, "Credential check failed");
                e
            })
    }
}
