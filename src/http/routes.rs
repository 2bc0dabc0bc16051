//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use super::{api, middleware::login_rate_limit, AppError};
use crate::app::AppState;
use crate::domain::validation::validate_intake;
use crate::domain::{
    Account, AccountUpdate, EntityId, NewAccount, Supply, SupplyInput, SupplyUsage, Visit,
    VisitDraft, VisitFilter, VisitStats, ADMIN_USER,
};
use crate::services::LowStockAlert;
use crate::util::time::{uptime_secs, visit_stamp};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    let login_routes = Router::new()
        .route("/app/login", post(login_handler))
        .layer(middleware::from_fn_with_state(state.clone(), login_rate_limit));

    let app_routes = Router::new()
        .route("/app/insumos", get(list_supplies_handler).post(create_supply_handler))
        .route("/app/insumos/descontar", post(decrement_handler))
        .route("/app/insumos/alertas", get(alerts_handler))
        .route("/app/insumos/export", get(export_handler))
        .route("/app/insumos/:id", put(update_supply_handler).delete(delete_supply_handler))
        .route("/app/consultas", get(list_visits_handler).post(intake_handler))
        .route("/app/consultas/:id", put(update_visit_handler).delete(delete_visit_handler))
        .route("/app/estadisticas", get(stats_handler))
        .route("/app/cuentas", get(list_accounts_handler).post(create_account_handler))
        .route("/app/cuentas/:id", put(update_account_handler).delete(delete_account_handler));

    Router::new()
        .route("/health", get(health_handler))
        .merge(api::router())
        .merge(app_routes)
        .merge(login_routes)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    records_backend: &'static str,
    accounts_backend: &'static str,
    database_configured: bool,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let flags = state.config.storage;
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        records_backend: flags.records_backend().as_str(),
        accounts_backend: flags.accounts_backend().as_str(),
        database_configured: state.db.is_some(),
    })
}

// ============================================================================
// Supply endpoints
// ============================================================================

#[derive(Deserialize)]
struct SupplySearch {
    #[serde(default)]
    buscar: String,
}

async fn list_supplies_handler(
    State(state): State<AppState>,
    Query(search): Query<SupplySearch>,
) -> Json<Vec<Supply>> {
    Json(state.supplies.search(&search.buscar).await)
}

async fn create_supply_handler(
    State(state): State<AppState>,
    Json(input): Json<SupplyInput>,
) -> Result<impl IntoResponse, AppError> {
    let supply = state.supplies.create(&input).await?;
    Ok((StatusCode::CREATED, Json(supply)))
}

async fn update_supply_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<SupplyInput>,
) -> Result<Json<Supply>, AppError> {
    state
        .supplies
        .update(&EntityId::parse(&id), &input)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Insumo no encontrado".to_string()))
}

async fn delete_supply_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.supplies.delete(&EntityId::parse(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn decrement_handler(
    State(state): State<AppState>,
    Json(usages): Json<Vec<SupplyUsage>>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.supplies.decrement(&usages).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn alerts_handler(State(state): State<AppState>) -> Json<Vec<LowStockAlert>> {
    Json(state.supplies.low_stock().await)
}

async fn export_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let csv = state.supplies.export_csv().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"insumos.csv\""),
        ],
        csv,
    ))
}

// ============================================================================
// Visit endpoints
// ============================================================================

async fn list_visits_handler(
    State(state): State<AppState>,
    Query(filter): Query<VisitFilter>,
) -> Json<Vec<Visit>> {
    Json(state.visits.filter(&filter).await)
}

/// Patient intake: validate, stamp, consume supplies, save
async fn intake_handler(
    State(state): State<AppState>,
    Json(mut draft): Json<VisitDraft>,
) -> Result<impl IntoResponse, AppError> {
    validate_intake(&draft).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let (fecha, hora) = visit_stamp();
    draft.fecha = fecha;
    draft.hora = hora;
    if draft.usuario.trim().is_empty() {
        draft.usuario = ADMIN_USER.to_string();
    }

    let visit = state.visits.record(&state.supplies, &draft).await?;
    Ok((StatusCode::CREATED, Json(visit)))
}

async fn update_visit_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<VisitDraft>,
) -> Result<Json<Visit>, AppError> {
    state
        .visits
        .update(&EntityId::parse(&id), &draft)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Consulta no encontrada".to_string()))
}

async fn delete_visit_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.visits.delete(&EntityId::parse(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stats_handler(State(state): State<AppState>) -> Json<VisitStats> {
    Json(state.visits.stats().await)
}

// ============================================================================
// Account endpoints
// ============================================================================

async fn list_accounts_handler(State(state): State<AppState>) -> Result<Json<Vec<Account>>, AppError> {
    Ok(Json(state.accounts.list().await?))
}

async fn create_account_handler(
    State(state): State<AppState>,
    Json(account): Json<NewAccount>,
) -> Result<impl IntoResponse, AppError> {
    let created = state.accounts.create(&account).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_account_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<AccountUpdate>,
) -> Result<Json<Account>, AppError> {
    if update.usuario.as_deref().is_some_and(|usuario| usuario != ADMIN_USER) {
        let accounts = state.accounts.list().await?;
        if accounts.iter().any(|a| a.id == id && a.is_admin()) {
            return Err(AppError::BadRequest(
                "No se puede renombrar la cuenta de administrador".to_string(),
            ));
        }
    }

    state
        .accounts
        .update(&id, &update)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Cuenta no encontrada".to_string()))
}

async fn delete_account_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let accounts = state.accounts.list().await?;
    if accounts.iter().any(|a| a.id == id && a.is_admin()) {
        return Err(AppError::BadRequest(
            "No se puede eliminar la cuenta de administrador".to_string(),
        ));
    }

    state.accounts.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct LoginRequest {
    usuario: String,
    password: String,
}

async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Account>, AppError> {
    let account = state
        .accounts
        .validate_credentials(&req.usuario, &req.password)
        .await?
        .ok_or(AppError::Unauthorized)?;

    info!(usuario = %account.usuario, "Login succeeded");
    Ok(Json(account))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::services::Services;
    use crate::storage::{Backends, LocalStore};

    fn app() -> Router {
        let config = Config::from_vars(|_| None).unwrap();
        let local = LocalStore::in_memory();
        let backends = Backends::from_config(&config, local.clone());
        build_router(AppState::from_parts(config, None, Services::new(backends, local)))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn intake(rut: &str, edad: i64, telefono: &str) -> Value {
        json!({
            "nombre": "Juan Pérez",
            "edad": edad,
            "rut": rut,
            "carrera": "Enfermería",
            "telefono": telefono,
            "motivo": "Curación",
            "insumos": [{"id": 1, "nombre": "Guantes", "cantidad": 2}],
            "vitales": [{"presion": "120/80", "fc": "72"}],
            "diae": true
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["records_backend"], "local");
        assert_eq!(body["database_configured"], false);
    }

    #[tokio::test]
    async fn test_created_supply_is_listed() {
        let app = app();
        let (status, created) = send(
            &app,
            Method::POST,
            "/app/insumos",
            Some(json!({"nombre": "Gasas", "cantidad": "10"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(created["id"].as_i64().unwrap() >= 1);

        let (_, listed) = send(&app, Method::GET, "/app/insumos?buscar=gasa", None).await;
        assert_eq!(listed, json!([{"id": 4, "nombre": "Gasas", "cantidad": 10}]));
    }

    #[tokio::test]
    async fn test_decrement_clamps_at_zero() {
        let app = app();
        send(&app, Method::PUT, "/app/insumos/3", Some(json!({"nombre": "Alcohol", "cantidad": 5}))).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/app/insumos/descontar",
            Some(json!([{"id": 3, "cantidad": 20}])),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));

        let (_, listed) = send(&app, Method::GET, "/app/insumos", None).await;
        assert_eq!(listed[2]["cantidad"], 0);

        let (_, alerts) = send(&app, Method::GET, "/app/insumos/alertas", None).await;
        assert_eq!(alerts[0]["nombre"], "Alcohol");
        assert_eq!(alerts[0]["inicial"], 10);
    }

    #[tokio::test]
    async fn test_missing_supply_update_is_404_and_delete_is_noop() {
        let app = app();
        let (status, _) = send(&app, Method::PUT, "/app/insumos/99", Some(json!({"nombre": "X", "cantidad": 1}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::DELETE, "/app/insumos/99", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, listed) = send(&app, Method::GET, "/app/insumos", None).await;
        assert_eq!(listed.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_export_is_csv() {
        let response = app()
            .oneshot(Request::get("/app/insumos/export").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv"));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"Nombre,Cantidad\n"));
    }

    #[tokio::test]
    async fn test_intake_records_visit_and_consumes_supplies() {
        let app = app();
        let (status, visit) = send(
            &app,
            Method::POST,
            "/app/consultas",
            Some(intake("17560742-0", 25, "912345678")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(visit["usuario"], "admin");
        assert!(!visit["fecha"].as_str().unwrap().is_empty());
        assert!(!visit["hora"].as_str().unwrap().is_empty());

        let (_, supplies) = send(&app, Method::GET, "/app/insumos", None).await;
        assert_eq!(supplies[0]["cantidad"], 18);

        let (_, found) = send(&app, Method::GET, "/app/consultas?carrera=enfer&rut=17560742", None).await;
        assert_eq!(found.as_array().unwrap().len(), 1);

        let (_, stats) = send(&app, Method::GET, "/app/estadisticas", None).await;
        assert_eq!(stats, json!({"total_pacientes": 1, "total_seguros": 1, "carreras": ["Enfermería"]}));
    }

    #[tokio::test]
    async fn test_intake_validation_messages() {
        let app = app();
        let cases = [
            (intake("1234", 25, "912345678"), "RUT inválido"),
            (intake("17560742-0", -1, "912345678"), "Edad inválida"),
            (
                {
                    let mut body = intake("17560742-0", 25, "912345678");
                    body["edad"] = json!("abc");
                    body
                },
                "Edad inválida",
            ),
            (intake("17560742-0", 25, "12ab"), "Teléfono inválido"),
        ];
        for (body, message) in cases {
            let (status, error) = send(&app, Method::POST, "/app/consultas", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(error["error"], message);
        }

        // Rejected intakes leave stock untouched
        let (_, supplies) = send(&app, Method::GET, "/app/insumos", None).await;
        assert_eq!(supplies[0]["cantidad"], 20);
    }

    #[tokio::test]
    async fn test_visit_update_and_delete() {
        let app = app();
        let (_, visit) = send(&app, Method::POST, "/app/consultas", Some(intake("17560742-0", 25, ""))).await;
        let uri = format!("/app/consultas/{}", visit["id"]);

        let mut edited = visit.clone();
        edited["tratamiento"] = json!("Reposo");
        let (status, updated) = send(&app, Method::PUT, &uri, Some(edited)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["tratamiento"], "Reposo");

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, listed) = send(&app, Method::GET, "/app/consultas", None).await;
        assert!(listed.as_array().unwrap().is_empty());

        let (status, _) = send(&app, Method::PUT, &uri, Some(visit)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_accounts_and_login() {
        let app = app();
        let (status, created) = send(
            &app,
            Method::POST,
            "/app/cuentas",
            Some(json!({
                "usuario": "maria",
                "email": "maria@sigep.cl",
                "rut": "12345678-5",
                "cargo": "Enfermera",
                "password": "clave123"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(created.get("password").is_none());

        let (_, listed) = send(&app, Method::GET, "/app/cuentas", None).await;
        assert_eq!(listed.as_array().unwrap().len(), 2);

        let (status, account) = send(
            &app,
            Method::POST,
            "/app/login",
            Some(json!({"usuario": "maria", "password": "clave123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(account["cargo"], "Enfermera");

        let (status, _) = send(
            &app,
            Method::POST,
            "/app/login",
            Some(json!({"usuario": "maria", "password": "mala"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_account_cannot_be_deleted() {
        let app = app();
        let (status, body) = send(&app, Method::DELETE, "/app/cuentas/1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("administrador"));

        let (_, listed) = send(&app, Method::GET, "/app/cuentas", None).await;
        assert_eq!(listed[0]["usuario"], "admin");
    }

    #[tokio::test]
    async fn test_admin_account_cannot_be_renamed() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::PUT,
            "/app/cuentas/1",
            Some(json!({"usuario": "jefe"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("administrador"));

        let (status, body) = send(&app, Method::DELETE, "/app/cuentas/1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("administrador"));

        let (_, listed) = send(&app, Method::GET, "/app/cuentas", None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["usuario"], "admin");
    }

    #[tokio::test]
    async fn test_admin_account_other_fields_can_change() {
        let app = app();
        let (status, updated) = send(
            &app,
            Method::PUT,
            "/app/cuentas/1",
            Some(json!({"usuario": "admin", "cargo": "Jefatura"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["usuario"], "admin");
        assert_eq!(updated["cargo"], "Jefatura");
    }

    #[tokio::test]
    async fn test_login_is_rate_limited() {
        let app = app();
        let mut statuses = Vec::new();
        for _ in 0..10 {
            let (status, _) = send(
                &app,
                Method::POST,
                "/app/login",
                Some(json!({"usuario": "admin", "password": "x"})),
            )
            .await;
            statuses.push(status);
        }
        assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS));
    }

    #[tokio::test]
    async fn test_api_routes_need_a_database() {
        let app = app();
        for (method, uri) in [
            (Method::GET, "/api/insumos"),
            (Method::GET, "/api/consultas"),
            (Method::DELETE, "/api/insumos/1"),
        ] {
            let (status, body) = send(&app, method, uri, None).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body, json!({"error": "DATABASE_URL not configured"}));
        }

        let (status, _) = send(&app, Method::PATCH, "/api/insumos", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
