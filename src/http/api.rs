//! SQL-backed `/api` routes: one verb on one path, one statement

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde_json::json;

use super::AppError;
use crate::app::AppState;
use crate::db::PgStore;
use crate::domain::{EntityId, Supply, SupplyInput, SupplyUsage, Visit, VisitDraft};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/insumos", get(list_supplies).post(create_supply))
        .route("/api/insumos/descontar", post(decrement_supplies))
        .route("/api/insumos/:id", put(update_supply).delete(delete_supply))
        .route("/api/consultas", get(list_visits).post(create_visit))
        .route("/api/consultas/:id", put(update_visit).delete(delete_visit))
}

/// The configured pool with its schema in place
async fn database(state: &AppState) -> Result<&PgStore, AppError> {
    let db = state
        .db
        .as_ref()
        .ok_or(AppError::NotConfigured("DATABASE_URL not configured"))?;
    db.ensure_schema().await;
    Ok(db)
}

// ============================================================================
// insumos
// ============================================================================

async fn list_supplies(State(state): State<AppState>) -> Result<Json<Vec<Supply>>, AppError> {
    Ok(Json(database(&state).await?.list_supplies().await?))
}

async fn create_supply(
    State(state): State<AppState>,
    Json(input): Json<SupplyInput>,
) -> Result<impl IntoResponse, AppError> {
    let supply = database(&state).await?.insert_supply(&input).await?;
    Ok((StatusCode::CREATED, Json(supply)))
}

async fn update_supply(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<SupplyInput>,
) -> Result<Json<Supply>, AppError> {
    database(&state)
        .await?
        .update_supply(&EntityId::parse(&id), &input)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Not found".to_string()))
}

async fn delete_supply(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    database(&state).await?.delete_supply(&EntityId::parse(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn decrement_supplies(
    State(state): State<AppState>,
    Json(usages): Json<Vec<SupplyUsage>>,
) -> Result<Json<serde_json::Value>, AppError> {
    database(&state).await?.decrement_supplies(&usages).await?;
    Ok(Json(json!({ "ok": true })))
}

// ============================================================================
// consultas
// ============================================================================

async fn list_visits(State(state): State<AppState>) -> Result<Json<Vec<Visit>>, AppError> {
    Ok(Json(database(&state).await?.list_visits().await?))
}

async fn create_visit(
    State(state): State<AppState>,
    Json(draft): Json<VisitDraft>,
) -> Result<impl IntoResponse, AppError> {
    let visit = database(&state).await?.insert_visit(&draft).await?;
    Ok((StatusCode::CREATED, Json(visit)))
}

async fn update_visit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<VisitDraft>,
) -> Result<Json<Visit>, AppError> {
    database(&state)
        .await?
        .update_visit(&EntityId::parse(&id), &draft)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Not found".to_string()))
}

async fn delete_visit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    database(&state).await?.delete_visit(&EntityId::parse(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
