//! Domain services over the selected storage providers
//!
//! Remote reads refresh the local snapshot; page loads fall back to it when
//! the provider fails.

pub mod accounts;
pub mod supplies;
pub mod visits;

pub use accounts::AccountService;
pub use supplies::{LowStockAlert, SupplyService};
pub use visits::VisitService;

use crate::storage::{Backends, LocalStore, StorageError};

/// Errors outside the storage layer
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("CSV export failed: {0}")]
    Export(#[from] csv::Error),
}

/// All services wired to one set of providers
#[derive(Clone)]
pub struct Services {
    pub supplies: SupplyService,
    pub visits: VisitService,
    pub accounts: AccountService,
}

impl Services {
    pub fn new(backends: Backends, cache: LocalStore) -> Self {
        Self {
            supplies: SupplyService::new(
                backends.supplies,
                cache.clone(),
                backends.records_kind.is_remote(),
            ),
            visits: VisitService::new(backends.visits, cache, backends.records_kind.is_remote()),
            accounts: AccountService::new(backends.accounts),
        }
    }
}
