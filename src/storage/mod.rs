//! Storage providers for supplies, visits and accounts
//!
//! Each entity is served through one trait object chosen once at startup:
//! the local JSON store, the relational HTTP API, or Firestore.

pub mod api_client;
pub mod firebase_auth;
pub mod firestore;
pub mod local;
pub mod local_backend;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BackendKind, Config};
use crate::domain::{
    Account, AccountUpdate, EntityId, NewAccount, Supply, SupplyInput, SupplyUsage, Visit,
    VisitDraft,
};

pub use api_client::RelationalApiClient;
pub use firestore::FirestoreBackend;
pub use local::LocalStore;
pub use local_backend::LocalBackend;

/// Local key of the supplies snapshot
pub const SUPPLIES_KEY: &str = "insumos_medicos_v1";
/// Local key of the visits snapshot
pub const VISITS_KEY: &str = "consultas_v1";
/// Local key of the accounts snapshot
pub const ACCOUNTS_KEY: &str = "cuentas";

pub type StorageResult<T> = Result<T, StorageError>;

/// Supply persistence
#[async_trait]
pub trait SupplyStore: Send + Sync {
    async fn list_supplies(&self) -> StorageResult<Vec<Supply>>;

    async fn create_supply(&self, input: &SupplyInput) -> StorageResult<Supply>;

    /// `None` when no supply has that id
    async fn update_supply(&self, id: &EntityId, input: &SupplyInput) -> StorageResult<Option<Supply>>;

    /// Deleting a missing id is not an error
    async fn delete_supply(&self, id: &EntityId) -> StorageResult<()>;

    /// Subtract each usage from its supply, clamping at zero; unknown ids are skipped
    async fn decrement_supplies(&self, usages: &[SupplyUsage]) -> StorageResult<()>;
}

/// Visit persistence
#[async_trait]
pub trait VisitStore: Send + Sync {
    /// Newest first
    async fn list_visits(&self) -> StorageResult<Vec<Visit>>;

    async fn create_visit(&self, draft: &VisitDraft) -> StorageResult<Visit>;

    async fn update_visit(&self, id: &EntityId, draft: &VisitDraft) -> StorageResult<Option<Visit>>;

    async fn delete_visit(&self, id: &EntityId) -> StorageResult<()>;
}

/// Account metadata and credential checks
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn list_accounts(&self) -> StorageResult<Vec<Account>>;

    async fn create_account(&self, account: &NewAccount) -> StorageResult<Account>;

    async fn update_account(&self, id: &str, update: &AccountUpdate) -> StorageResult<Option<Account>>;

    async fn delete_account(&self, id: &str) -> StorageResult<()>;

    /// `None` when the credentials do not match any account
    async fn validate_credentials(
        &self,
        user_or_email: &str,
        password: &str,
    ) -> StorageResult<Option<Account>>;
}

/// The providers selected for this process
#[derive(Clone)]
pub struct Backends {
    pub supplies: Arc<dyn SupplyStore>,
    pub visits: Arc<dyn VisitStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub records_kind: BackendKind,
    pub accounts_kind: BackendKind,
}

impl Backends {
    /// Pick one provider per entity from the configured flags
    pub fn from_config(config: &Config, local: LocalStore) -> Self {
        let local_backend = Arc::new(LocalBackend::new(local));

        // Firestore is only flagged on when its parameters exist
        let firestore = config
            .firebase
            .as_ref()
            .filter(|_| config.storage.use_firebase)
            .map(|firebase| Arc::new(FirestoreBackend::new(firebase)));

        let records_kind = config.storage.records_backend();
        let accounts_kind = config.storage.accounts_backend();

        let supplies: Arc<dyn SupplyStore>;
        let visits: Arc<dyn VisitStore>;
        match (records_kind, &firestore) {
            (BackendKind::Firestore, Some(fs)) => {
                supplies = fs.clone();
                visits = fs.clone();
            }
            (BackendKind::RelationalApi, _) => {
                let api = Arc::new(RelationalApiClient::new(&config.api_base_url));
                supplies = api.clone();
                visits = api;
            }
            _ => {
                supplies = local_backend.clone();
                visits = local_backend.clone();
            }
        }

        let accounts: Arc<dyn AccountStore> = match (accounts_kind, &firestore) {
            (BackendKind::Firestore, Some(fs)) => fs.clone(),
            _ => local_backend,
        };

        Self {
            supplies,
            visits,
            accounts,
            records_kind,
            accounts_kind,
        }
    }
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode stored data: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unexpected document: {0}")]
    Document(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}
