//! Application state shared across routes

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::db::PgStore;
use crate::services::{AccountService, Services, SupplyService, VisitService};
use crate::storage::{Backends, LocalStore};
use crate::util::rate_limit::{create_limiter, Limiter, LOGIN_RATE_LIMIT};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Present only when `DATABASE_URL` is configured
    pub db: Option<PgStore>,
    pub supplies: SupplyService,
    pub visits: VisitService,
    pub accounts: AccountService,
    pub login_limiter: Arc<Limiter>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, sqlx::Error> {
        let db = PgStore::from_config(&config)?;

        let local = LocalStore::from_dir(config.local_store_dir.as_deref());
        let backends = Backends::from_config(&config, local.clone());
        info!(
            records = backends.records_kind.as_str(),
            accounts = backends.accounts_kind.as_str(),
            local_store = local.is_available(),
            "Storage backends selected"
        );

        Ok(Self::from_parts(config, db, Services::new(backends, local)))
    }

    pub fn from_parts(config: Config, db: Option<PgStore>, services: Services) -> Self {
        Self {
            config: Arc::new(config),
            db,
            supplies: services.supplies,
            visits: services.visits,
            accounts: services.accounts,
            login_limiter: create_limiter(LOGIN_RATE_LIMIT),
        }
    }
}
