//! Firestore REST client and the document-store provider

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, warn};

use super::firebase_auth::FirebaseAuth;
use super::{AccountStore, StorageError, StorageResult, SupplyStore, VisitStore};
use crate::config::FirebaseConfig;
use crate::domain::{
    decremented, login_email, Account, AccountUpdate, EntityId, NewAccount, Supply, SupplyInput,
    SupplyUsage, Visit, VisitDraft,
};
use crate::util::time::display_timestamp;

pub const SUPPLIES_COLLECTION: &str = "insumos";
pub const VISITS_COLLECTION: &str = "consultas";
pub const ACCOUNTS_COLLECTION: &str = "cuentas";

const PAGE_SIZE: u32 = 300;

/// Firestore document as returned by the REST API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub create_time: Option<String>,
}

impl Document {
    /// Trailing segment of the resource name
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Plain JSON object with `id` (and `created_at`, when absent) filled in
    pub fn to_json(&self) -> Value {
        let mut object = decode_fields(&self.fields);
        object.insert("id".to_string(), Value::String(self.id().to_string()));
        if let Some(created) = &self.create_time {
            object
                .entry("created_at")
                .or_insert_with(|| Value::String(created.clone()));
        }
        Value::Object(object)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> StorageResult<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct QueryResult {
    #[serde(default)]
    document: Option<Document>,
}

// ============================================================================
// Value codec
// ============================================================================

/// Plain JSON to a Firestore typed value
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or(0.0) }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub fn encode_fields(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

/// Firestore typed value back to plain JSON
pub fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|o| o.iter().next()) else {
        return Value::Null;
    };

    match kind.as_str() {
        "booleanValue" => inner.clone(),
        "integerValue" => match inner {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            other => other.clone(),
        },
        "doubleValue" => inner.clone(),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "geoPointValue" => inner.clone(),
        "arrayValue" => {
            let values: Vec<Value> = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(decode_value).collect())
                .unwrap_or_default();
            Value::Array(values)
        }
        "mapValue" => {
            let fields = inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .unwrap_or_default();
            Value::Object(fields)
        }
        _ => Value::Null,
    }
}

pub fn decode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), decode_value(v)))
        .collect()
}

fn to_object<T: Serialize>(value: &T) -> StorageResult<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::Document(format!("expected an object, got {}", other))),
    }
}

// ============================================================================
// REST client
// ============================================================================

/// Firestore documents API for one project
#[derive(Clone)]
pub struct FirestoreClient {
    client: Client,
    documents_url: String,
    api_key: String,
    emulator: bool,
}

impl FirestoreClient {
    pub fn new(config: &FirebaseConfig) -> Self {
        let (root, emulator) = match &config.firestore_emulator_host {
            Some(host) => (format!("http://{}/v1", host), true),
            None => ("https://firestore.googleapis.com/v1".to_string(), false),
        };
        Self::with_root(Client::new(), &root, &config.project_id, &config.api_key, emulator)
    }

    pub fn with_root(client: Client, root: &str, project_id: &str, api_key: &str, emulator: bool) -> Self {
        Self {
            client,
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                root.trim_end_matches('/'),
                project_id
            ),
            api_key: api_key.to_string(),
            emulator,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.query(&[("key", self.api_key.as_str())]);
        if self.emulator {
            // The emulator treats this token as an admin and skips security rules
            request.bearer_auth("owner")
        } else {
            request
        }
    }

    async fn send(&self, request: RequestBuilder) -> StorageResult<reqwest::Response> {
        let response = self.authorize(request).send().await?;
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

    /// Every document in a collection, following page tokens
    pub async fn list(&self, collection: &str) -> StorageResult<Vec<Document>> {
        let url = format!("{}/{}", self.documents_url, collection);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: ListResponse = self.send(request).await?.json().await?;
            documents.extend(page.documents);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(documents)
    }

    /// One document by id; `None` when it does not exist
    pub async fn get(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        let url = format!("{}/{}/{}", self.documents_url, collection, id);
        match self.send(self.client.get(&url)).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(StorageError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Add a document with a store-generated id
    pub async fn create(&self, collection: &str, fields: &Map<String, Value>) -> StorageResult<Document> {
        let url = format!("{}/{}", self.documents_url, collection);
        let body = json!({ "fields": encode_fields(fields) });
        Ok(self.send(self.client.post(&url).json(&body)).await?.json().await?)
    }

    /// Overwrite the masked fields of an existing document; `None` when it does not exist
    pub async fn patch(
        &self,
        collection: &str,
        id: &str,
        fields: &Map<String, Value>,
        mask: &[&str],
    ) -> StorageResult<Option<Document>> {
        let url = format!("{}/{}/{}", self.documents_url, collection, id);
        let mut query: Vec<(&str, &str)> = mask.iter().map(|f| ("updateMask.fieldPaths", *f)).collect();
        query.push(("currentDocument.exists", "true"));

        let request = self
            .client
            .patch(&url)
            .query(&query)
            .json(&json!({ "fields": encode_fields(fields) }));

        match self.send(request).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(StorageError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete a document; deleting a missing one succeeds
    pub async fn delete(&self, collection: &str, id: &str) -> StorageResult<()> {
        let url = format!("{}/{}/{}", self.documents_url, collection, id);
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }

    /// Documents whose string `field` equals `value`
    pub async fn find_by(&self, collection: &str, field: &str, value: &str, limit: u32) -> StorageResult<Vec<Document>> {
        let url = format!("{}:runQuery", self.documents_url);
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": field },
                        "op": "EQUAL",
                        "value": { "stringValue": value }
                    }
                },
                "limit": limit
            }
        });

        let results: Vec<QueryResult> = self.send(self.client.post(&url).json(&body)).await?.json().await?;
        Ok(results.into_iter().filter_map(|r| r.document).collect())
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Document-store provider for every entity
#[derive(Clone)]
pub struct FirestoreBackend {
    client: FirestoreClient,
    auth: FirebaseAuth,
}

impl FirestoreBackend {
    pub fn new(config: &FirebaseConfig) -> Self {
        Self::from_parts(FirestoreClient::new(config), FirebaseAuth::new(config))
    }

    pub fn from_parts(client: FirestoreClient, auth: FirebaseAuth) -> Self {
        Self { client, auth }
    }

    fn decode_all<T: DeserializeOwned>(documents: &[Document]) -> StorageResult<Vec<T>> {
        documents.iter().map(|d| d.decode()).collect()
    }
}

#[async_trait]
impl SupplyStore for FirestoreBackend {
    async fn list_supplies(&self) -> StorageResult<Vec<Supply>> {
        let documents = self.client.list(SUPPLIES_COLLECTION).await?;
        Self::decode_all(&documents)
    }

    async fn create_supply(&self, input: &SupplyInput) -> StorageResult<Supply> {
        let document = self.client.create(SUPPLIES_COLLECTION, &to_object(input)?).await?;
        document.decode()
    }

    async fn update_supply(&self, id: &EntityId, input: &SupplyInput) -> StorageResult<Option<Supply>> {
        let id = id.to_string();
        let document = self
            .client
            .patch(SUPPLIES_COLLECTION, &id, &to_object(input)?, &["nombre", "cantidad"])
            .await?;
        document.map(|d| d.decode()).transpose()
    }

    async fn delete_supply(&self, id: &EntityId) -> StorageResult<()> {
        self.client.delete(SUPPLIES_COLLECTION, &id.to_string()).await
    }

    async fn decrement_supplies(&self, usages: &[SupplyUsage]) -> StorageResult<()> {
        // Read-then-write without a transaction: concurrent decrements of the
        // same document can lose an update.
        let mut supplies = self.list_supplies().await?;
        for usage in usages {
            let Some(supply) = supplies.iter_mut().find(|s| s.id == usage.id) else {
                warn!(id = %usage.id, "Skipping decrement of unknown supply");
                continue;
            };
            supply.cantidad = decremented(supply.cantidad, usage.cantidad);

            let mut fields = Map::new();
            fields.insert("cantidad".to_string(), Value::from(supply.cantidad));
            self.client
                .patch(SUPPLIES_COLLECTION, &supply.id.to_string(), &fields, &["cantidad"])
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl VisitStore for FirestoreBackend {
    async fn list_visits(&self) -> StorageResult<Vec<Visit>> {
        let documents = self.client.list(VISITS_COLLECTION).await?;
        let mut visits: Vec<Visit> = Self::decode_all(&documents)?;
        visits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(visits)
    }

    async fn create_visit(&self, draft: &VisitDraft) -> StorageResult<Visit> {
        let document = self.client.create(VISITS_COLLECTION, &to_object(draft)?).await?;
        document.decode()
    }

    async fn update_visit(&self, id: &EntityId, draft: &VisitDraft) -> StorageResult<Option<Visit>> {
        let fields = to_object(draft)?;
        // Masked fields missing from the body are cleared, so include optional ones
        let mut mask: Vec<&str> = fields.keys().map(String::as_str).collect();
        if !fields.contains_key("imagen") {
            mask.push("imagen");
        }
        let document = self
            .client
            .patch(VISITS_COLLECTION, &id.to_string(), &fields, &mask)
            .await?;
        document.map(|d| d.decode()).transpose()
    }

    async fn delete_visit(&self, id: &EntityId) -> StorageResult<()> {
        self.client.delete(VISITS_COLLECTION, &id.to_string()).await
    }
}

#[async_trait]
impl AccountStore for FirestoreBackend {
    async fn list_accounts(&self) -> StorageResult<Vec<Account>> {
        let documents = self.client.list(ACCOUNTS_COLLECTION).await?;
        Self::decode_all(&documents)
    }

    async fn create_account(&self, new: &NewAccount) -> StorageResult<Account> {
        let user = self.auth.sign_up(&new.email, &new.password).await?;

        // Credentials stay with the auth provider; only metadata is stored
        let account = Account {
            id: String::new(),
            usuario: new.usuario.clone(),
            email: new.email.clone(),
            rut: new.rut.clone(),
            cargo: new.cargo.clone(),
            fecha: display_timestamp(),
            uid: Some(user.local_id),
        };
        let mut fields = to_object(&account)?;
        fields.remove("id");

        let document = self.client.create(ACCOUNTS_COLLECTION, &fields).await?;
        document.decode()
    }

    async fn update_account(&self, id: &str, update: &AccountUpdate) -> StorageResult<Option<Account>> {
        // uid and email belong to the auth provider and are never edited here
        let mut fields = Map::new();
        for (name, value) in [
            ("usuario", &update.usuario),
            ("rut", &update.rut),
            ("cargo", &update.cargo),
        ] {
            if let Some(value) = value {
                fields.insert(name.to_string(), Value::String(value.clone()));
            }
        }
        let mask: Vec<&str> = fields.keys().map(String::as_str).collect();

        // An empty mask would overwrite the whole document
        let document = if mask.is_empty() {
            self.client.get(ACCOUNTS_COLLECTION, id).await?
        } else {
            self.client.patch(ACCOUNTS_COLLECTION, id, &fields, &mask).await?
        };
        document.map(|d| d.decode()).transpose()
    }

    async fn delete_account(&self, id: &str) -> StorageResult<()> {
        // The auth-provider user stays active; only the metadata goes away
        self.client.delete(ACCOUNTS_COLLECTION, id).await
    }

    async fn validate_credentials(
        &self,
        user_or_email: &str,
        password: &str,
    ) -> StorageResult<Option<Account>> {
        let Some(user) = self.auth.sign_in(&login_email(user_or_email), password).await? else {
            return Ok(None);
        };

        let basic = || Account {
            id: user.local_id.clone(),
            usuario: user_or_email.to_string(),
            email: user.email.clone(),
            cargo: "Usuario".to_string(),
            uid: Some(user.local_id.clone()),
            ..Default::default()
        };

        match self.client.find_by(ACCOUNTS_COLLECTION, "uid", &user.local_id, 1).await {
            Ok(documents) => match documents.first() {
                Some(document) => document.decode().map(Some),
                None => Ok(Some(basic())),
            },
            Err(e) => {
                error!(error = %e, "Failed to load account metadata after sign-in");
                Ok(Some(basic()))
            }
        }
    }
}
