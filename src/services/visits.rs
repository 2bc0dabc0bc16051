//! Visit records service

use std::sync::Arc;

use tracing::{error, info, warn};

use super::SupplyService;
use crate::domain::{EntityId, Visit, VisitDraft, VisitFilter, VisitStats};
use crate::storage::{LocalStore, StorageResult, VisitStore, VISITS_KEY};

#[derive(Clone)]
pub struct VisitService {
    store: Arc<dyn VisitStore>,
    cache: LocalStore,
    remote: bool,
}

impl VisitService {
    pub fn new(store: Arc<dyn VisitStore>, cache: LocalStore, remote: bool) -> Self {
        Self {
            store,
            cache,
            remote,
        }
    }

    /// Newest first; refreshes the local snapshot
    pub async fn list(&self) -> StorageResult<Vec<Visit>> {
        let visits = self.store.list_visits().await.map_err(|e| {
            error!(error = %e, "Failed to list visits");
            e
        })?;
        if self.remote {
            self.cache.set_json(VISITS_KEY, &visits);
        }
        Ok(visits)
    }

    pub async fn list_cached(&self) -> Vec<Visit> {
        match self.list().await {
            Ok(visits) => visits,
            Err(e) => {
                warn!(error = %e, "Serving cached visits");
                self.cache.get_json(VISITS_KEY, Vec::new())
            }
        }
    }

    pub async fn create(&self, draft: &VisitDraft) -> StorageResult<Visit> {
        self.store.create_visit(draft).await.map_err(|e| {
            error!(error = %e, "Failed to save visit");
            e
        })
    }

    pub async fn update(&self, id: &EntityId, draft: &VisitDraft) -> StorageResult<Option<Visit>> {
        self.store.update_visit(id, draft).await.map_err(|e| {
            error!(error = %e, %id, "Failed to update visit");
            e
        })
    }

    pub async fn delete(&self, id: &EntityId) -> StorageResult<()> {
        self.store.delete_visit(id).await.map_err(|e| {
            error!(error = %e, %id, "Failed to delete visit");
            e
        })
    }

    pub async fn filter(&self, filter: &VisitFilter) -> Vec<Visit> {
        filter.apply(self.list_cached().await)
    }

    /// Intake: consume the supplies used, then save the visit.
    /// A failed decrement aborts before anything is saved.
    pub async fn record(&self, supplies: &SupplyService, draft: &VisitDraft) -> StorageResult<Visit> {
        supplies.decrement(&draft.insumos).await?;
        let visit = self.create(draft).await?;
        info!(id = %visit.id, usuario = %visit.details.usuario, insumos = draft.insumos.len(), "Visit recorded");
        Ok(visit)
    }

    pub async fn stats(&self) -> VisitStats {
        VisitStats::from_visits(&self.list_cached().await)
    }
}
