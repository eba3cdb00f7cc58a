use super::{json_body, AppState, ResourceId};
use crate::auth::AdminUser;
use crate::dto::{AccessoryCreate, AccessoryDto, AccessoryUpdate};
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use tracing::{info, instrument};

fn not_found(id: i32) -> ApiError {
    ApiError::NotFound(format!("Accessory {id} not found"))
}

/// List every accessory
#[instrument(skip(state))]
pub(super) async fn list_accessories(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<AccessoryDto>>> {
    let accessories = state.accessories.list().await?;
    Ok(Json(
        accessories.into_iter().map(AccessoryDto::from).collect(),
    ))
}

#[instrument(skip(state))]
pub(super) async fn get_accessory(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> ApiResult<Json<AccessoryDto>> {
    state
        .accessories
        .get(id)
        .await?
        .map(|accessory| Json(accessory.into()))
        .ok_or_else(|| not_found(id))
}

/// Create an accessory with a description no other accessory uses
#[instrument(skip(state, payload))]
pub(super) async fn create_accessory(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    payload: Result<Json<AccessoryCreate>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let accessory = json_body(payload)?.into_new()?;

    // Early rejection; the unique constraint still guards concurrent creates
    if state.accessories.exists(&accessory.description).await? {
        return Err(ApiError::Conflict(format!(
            "An accessory with description '{}' already exists",
            accessory.description
        )));
    }

    let created = state.accessories.create(accessory).await?;

    metrics::counter!("catalog.accessories.created").increment(1);
    info!(
        id = created.id,
        description = %created.description,
        admin = %admin.username,
        "Accessory created"
    );

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/accesorios/{}", created.id))],
        Json(AccessoryDto::from(created)),
    ))
}

/// Apply the fields present in the body to an existing accessory
#[instrument(skip(state, payload))]
pub(super) async fn update_accessory(
    State(state): State<AppState>,
    _admin: AdminUser,
    ResourceId(id): ResourceId,
    payload: Result<Json<AccessoryUpdate>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let update = json_body(payload)?;
    if update.id != id {
        return Err(ApiError::Validation(format!(
            "Path id {id} does not match body id {}",
            update.id
        )));
    }

    let mut accessory = state
        .accessories
        .get(id)
        .await?
        .ok_or_else(|| not_found(id))?;

    update.apply(&mut accessory, Utc::now())?;
    state.accessories.update(&accessory).await?;

    info!(id, "Accessory updated");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub(super) async fn delete_accessory(
    State(state): State<AppState>,
    _admin: AdminUser,
    ResourceId(id): ResourceId,
) -> ApiResult<StatusCode> {
    state.accessories.delete(id).await?;

    info!(id, "Accessory deleted");
    Ok(StatusCode::NO_CONTENT)
}
