//! Supply stock service

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, warn};

use super::ServiceError;
use crate::domain::{default_supplies, EntityId, Supply, SupplyInput, SupplyUsage};
use crate::storage::{LocalStore, StorageResult, SupplyStore, SUPPLIES_KEY};

/// Alerts fire below this share of the seeded quantity (percent)
const LOW_STOCK_PERCENT: i64 = 20;

/// A supply running low against its seeded quantity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockAlert {
    #[serde(flatten)]
    pub supply: Supply,
    pub inicial: i64,
}

#[derive(Clone)]
pub struct SupplyService {
    store: Arc<dyn SupplyStore>,
    cache: LocalStore,
    remote: bool,
}

impl SupplyService {
    pub fn new(store: Arc<dyn SupplyStore>, cache: LocalStore, remote: bool) -> Self {
        Self {
            store,
            cache,
            remote,
        }
    }

    /// Fetch from the provider and refresh the local snapshot
    pub async fn list(&self) -> StorageResult<Vec<Supply>> {
        let supplies = self.store.list_supplies().await.map_err(|e| {
            error!(error = %e, "Failed to list supplies");
            e
        })?;
        if self.remote {
            self.cache.set_json(SUPPLIES_KEY, &supplies);
        }
        Ok(supplies)
    }

    /// Like `list`, but serves the last local snapshot when the provider fails
    pub async fn list_cached(&self) -> Vec<Supply> {
        match self.list().await {
            Ok(supplies) => supplies,
            Err(e) => {
                warn!(error = %e, "Serving cached supplies");
                self.cache.get_json(SUPPLIES_KEY, default_supplies())
            }
        }
    }

    pub async fn create(&self, input: &SupplyInput) -> StorageResult<Supply> {
        self.store.create_supply(input).await.map_err(|e| {
            error!(error = %e, nombre = %input.nombre, "Failed to create supply");
            e
        })
    }

    pub async fn update(&self, id: &EntityId, input: &SupplyInput) -> StorageResult<Option<Supply>> {
        self.store.update_supply(id, input).await.map_err(|e| {
            error!(error = %e, %id, "Failed to update supply");
            e
        })
    }

    pub async fn delete(&self, id: &EntityId) -> StorageResult<()> {
        self.store.delete_supply(id).await.map_err(|e| {
            error!(error = %e, %id, "Failed to delete supply");
            e
        })
    }

    pub async fn decrement(&self, usages: &[SupplyUsage]) -> StorageResult<()> {
        if usages.is_empty() {
            return Ok(());
        }
        self.store.decrement_supplies(usages).await.map_err(|e| {
            error!(error = %e, items = usages.len(), "Failed to decrement supplies");
            e
        })
    }

    /// Supplies whose name contains `query`, ignoring case
    pub async fn search(&self, query: &str) -> Vec<Supply> {
        let query = query.trim().to_lowercase();
        let supplies = self.list_cached().await;
        if query.is_empty() {
            return supplies;
        }
        supplies
            .into_iter()
            .filter(|s| s.nombre.to_lowercase().contains(&query))
            .collect()
    }

    pub async fn low_stock(&self) -> Vec<LowStockAlert> {
        low_stock_alerts(self.list_cached().await, &default_supplies())
    }

    /// Stock sheet as `Nombre,Cantidad` rows
    pub async fn export_csv(&self) -> Result<String, ServiceError> {
        Ok(supplies_csv(&self.list_cached().await)?)
    }
}

fn low_stock_alerts(supplies: Vec<Supply>, baseline: &[Supply]) -> Vec<LowStockAlert> {
    supplies
        .into_iter()
        .filter_map(|supply| {
            let inicial = baseline.iter().find(|b| b.id == supply.id)?.cantidad;
            (inicial > 0
                && supply.cantidad.saturating_mul(100) < inicial.saturating_mul(LOW_STOCK_PERCENT))
                .then_some(LowStockAlert { supply, inicial })
        })
        .collect()
}

fn supplies_csv(supplies: &[Supply]) -> Result<String, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(["Nombre", "Cantidad"])?;
    for supply in supplies {
        writer.write_record([supply.nombre.as_str(), supply.cantidad.to_string().as_str()])?;
    }
    let bytes = writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
