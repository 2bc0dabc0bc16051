//! HTTP client for the relational `/api` routes

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use super::{StorageError, StorageResult, SupplyStore, VisitStore};
use crate::domain::{EntityId, Supply, SupplyInput, SupplyUsage, Visit, VisitDraft};

/// Talks to the SQL-backed API routes over HTTP
#[derive(Clone)]
pub struct RelationalApiClient {
    client: Client,
    base_url: String,
}

impl RelationalApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET and decode a JSON body
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> StorageResult<T> {
        let response = self.client.get(self.url(path)).send().await?;
        ensure_success(response).await?.json().await.map_err(StorageError::Request)
    }

    /// POST a JSON body and decode the reply
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> StorageResult<T> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        ensure_success(response).await?.json().await.map_err(StorageError::Request)
    }

    /// PUT a JSON body; a 404 means nothing matched
    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> StorageResult<Option<T>> {
        let response = self.client.put(self.url(path)).json(body).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        ensure_success(response)
            .await?
            .json()
            .await
            .map(Some)
            .map_err(StorageError::Request)
    }

    pub async fn delete(&self, path: &str) -> StorageResult<()> {
        let response = self.client.delete(self.url(path)).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}

async fn ensure_success(response: Response) -> StorageResult<Response> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(StorageError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

#[async_trait]
impl SupplyStore for RelationalApiClient {
    async fn list_supplies(&self) -> StorageResult<Vec<Supply>> {
        self.get("/api/insumos").await
    }

    async fn create_supply(&self, input: &SupplyInput) -> StorageResult<Supply> {
        self.post("/api/insumos", input).await
    }

    async fn update_supply(&self, id: &EntityId, input: &SupplyInput) -> StorageResult<Option<Supply>> {
        self.put(&format!("/api/insumos/{}", id), input).await
    }

    async fn delete_supply(&self, id: &EntityId) -> StorageResult<()> {
        self.delete(&format!("/api/insumos/{}", id)).await
    }

    async fn decrement_supplies(&self, usages: &[SupplyUsage]) -> StorageResult<()> {
        let _: serde_json::Value = self.post("/api/insumos/descontar", usages).await?;
        Ok(())
    }
}

#[async_trait]
impl VisitStore for RelationalApiClient {
    async fn list_visits(&self) -> StorageResult<Vec<Visit>> {
        self.get("/api/consultas").await
    }

    async fn create_visit(&self, draft: &VisitDraft) -> StorageResult<Visit> {
        self.post("/api/consultas", draft).await
    }

    async fn update_visit(&self, id: &EntityId, draft: &VisitDraft) -> StorageResult<Option<Visit>> {
        self.put(&format!("/api/consultas/{}", id), draft).await
    }

    async fn delete_visit(&self, id: &EntityId) -> StorageResult<()> {
        self.delete(&format!("/api/consultas/{}", id)).await
    }
}
