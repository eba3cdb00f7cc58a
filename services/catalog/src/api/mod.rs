//! HTTP surface of the catalog service.

mod accessories;
mod orders;
mod uploads;
mod users;

use crate::auth::JwtKeys;
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::repository::{AccessoryRepository, HealthCheck, OrderRepository, UserRepository};
use crate::upload_guard::UploadGuard;
use anyhow::{Context, Result};
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRef, FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub accessories: Arc<dyn AccessoryRepository>,
    pub users: Arc<dyn UserRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub health: Arc<dyn HealthCheck>,
    pub uploads: Arc<UploadGuard>,
    pub jwt: Arc<JwtKeys>,
}

impl FromRef<AppState> for Arc<JwtKeys> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.jwt)
    }
}

/// Numeric id from the last path segment. Ids that do not parse as `i32`
/// cannot name a stored row, so they answer 404 like a missing one.
#[derive(Debug, Clone, Copy)]
pub struct ResourceId(pub i32);

#[async_trait]
impl<S> FromRequestParts<S> for ResourceId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<i32>::from_request_parts(parts, state)
            .await
            .map(|Path(id)| ResourceId(id))
            .map_err(|rejection| {
                debug!(error = %rejection.body_text(), "Rejected path id");
                ApiError::NotFound("Resource not found".to_string())
            })
    }
}

/// Unwrap a JSON body, reporting unreadable bodies as validation errors
fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::Validation(rejection.body_text()))
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route(
            "/api/accesorios",
            get(accessories::list_accessories).post(accessories::create_accessory),
        )
        .route(
            "/api/accesorios/:id",
            get(accessories::get_accessory)
                .patch(accessories::update_accessory)
                .delete(accessories::delete_accessory),
        )
        .route("/api/upload", post(uploads::upload_model))
        .route("/api/usuarios/registro", post(users::register))
        .route("/api/usuarios/login", post(users::login))
        .route("/api/usuarios", get(users::list_users))
        .route(
            "/api/usuarios/:id",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/api/pedidos",
            get(orders::list_orders).post(orders::create_order),
        )
        .route(
            "/api/pedidos/:id",
            get(orders::get_order).delete(orders::delete_order),
        )
        .route("/api/pedidos/:id/estado", patch(orders::update_order_status))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "catalog-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.health.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "not_ready",
                    "database": "disconnected",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Start the API server, returning once `shutdown` resolves
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting catalog API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
