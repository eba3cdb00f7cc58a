use super::{json_body, AppState, ResourceId};
use crate::auth::{hash_password, verify_password, AdminUser, AuthUser};
use crate::dto::{LoginRequest, LoginResponse, RegisterRequest, UserDto, UserUpdate};
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use tokio::task;
use tracing::{info, instrument, warn};

fn not_found(id: i32) -> ApiError {
    ApiError::NotFound(format!("User {id} not found"))
}

/// Argon2 is CPU bound; keep it off the async workers
async fn hash_off_thread(password: String) -> ApiResult<String> {
    task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("Password hashing task failed: {e}")))?
}

#[instrument(skip(state, payload))]
pub(super) async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UserDto>)> {
    let request = json_body(payload)?;
    request.validate()?;

    if state.users.exists(request.username.trim()).await? {
        return Err(ApiError::Conflict(format!(
            "Username '{}' is already taken",
            request.username.trim()
        )));
    }

    let password_hash = hash_off_thread(request.password.clone()).await?;
    let user = state.users.create(request.into_new(password_hash)).await?;

    info!(id = user.id, username = %user.username, "User registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub(super) async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let request = json_body(payload)?;
    let invalid = || ApiError::Unauthorized("Invalid username or password".to_string());

    let user = state
        .users
        .get_by_username(&request.username)
        .await?
        .ok_or_else(invalid)?;

    let password_hash = user.password_hash.clone();
    let valid = task::spawn_blocking(move || verify_password(&request.password, &password_hash))
        .await
        .map_err(|e| ApiError::Internal(format!("Password verification task failed: {e}")))?;
    if !valid {
        warn!(username = %user.username, "Rejected login");
        return Err(invalid());
    }

    let token = state.jwt.issue(&user)?;
    info!(id = user.id, "User logged in");

    Ok(Json(LoginResponse {
        token,
        user: user.into(),
    }))
}

#[instrument(skip(state))]
pub(super) async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<UserDto>>> {
    let users = state.users.list().await?;
    Ok(Json(users.into_iter().map(UserDto::from).collect()))
}

#[instrument(skip(state))]
pub(super) async fn get_user(
    State(state): State<AppState>,
    caller: AuthUser,
    ResourceId(id): ResourceId,
) -> ApiResult<Json<UserDto>> {
    caller.ensure_owner_or_admin(id)?;

    state
        .users
        .get(id)
        .await?
        .map(|user| Json(user.into()))
        .ok_or_else(|| not_found(id))
}

/// Update profile fields; only admins may change a role
#[instrument(skip(state, payload))]
pub(super) async fn update_user(
    State(state): State<AppState>,
    caller: AuthUser,
    ResourceId(id): ResourceId,
    payload: Result<Json<UserUpdate>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let update = json_body(payload)?;
    if update.id != id {
        return Err(ApiError::Validation(format!(
            "Path id {id} does not match body id {}",
            update.id
        )));
    }
    caller.ensure_owner_or_admin(id)?;
    if update.role.is_some() && !caller.is_admin() {
        return Err(ApiError::Forbidden(
            "Only administrators can change roles".to_string(),
        ));
    }

    let mut user = state.users.get(id).await?.ok_or_else(|| not_found(id))?;

    update.apply_profile(&mut user);
    if let Some(role) = update.role {
        user.role = role;
    }
    if let Some(password) = update.password.filter(|p| !p.is_empty()) {
        user.password_hash = hash_off_thread(password).await?;
    }

    state.users.update(&user).await?;

    info!(id, "User updated");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub(super) async fn delete_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    ResourceId(id): ResourceId,
) -> ApiResult<StatusCode> {
    state.users.delete(id).await?;

    info!(id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::tests::TestApp;
    use crate::models::Role;
    use crate::repository::UserRepository;
    use axum::http::StatusCode;
    use serde_json::json;

    fn registration(username: &str) -> serde_json::Value {
        json!({
            "nombreUsuario": username,
            "nombre": "Ana",
            "apellido": "Rojas",
            "numeroCelular": "3001234567",
            "direccion": "Calle 1",
            "email": "ana@example.com",
            "password": "s3cret!"
        })
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let app = TestApp::new();

        let (status, _, user) = app
            .send("POST", "/api/usuarios/registro", None, Some(registration("ana")))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user["rol"], 0);
        assert!(user.get("password").is_none());
        assert!(!user.to_string().contains("argon2"));

        let (status, _, login) = app
            .send(
                "POST",
                "/api/usuarios/login",
                None,
                Some(json!({"nombreUsuario": "ana", "password": "s3cret!"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(login["usuario"]["nombreUsuario"], "ana");

        let token = login["token"].as_str().unwrap();
        let id = user["id"].as_i64().unwrap();
        let (status, _, me) = app
            .send("GET", &format!("/api/usuarios/{id}"), Some(token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], "ana@example.com");
    }

    #[tokio::test]
    async fn test_duplicate_username_and_bad_password() {
        let app = TestApp::new();
        app.send("POST", "/api/usuarios/registro", None, Some(registration("ana")))
            .await;

        let (status, _, error) = app
            .send("POST", "/api/usuarios/registro", None, Some(registration("ana")))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["code"], "CONFLICT");

        let (status, _, _) = app
            .send(
                "POST",
                "/api/usuarios/login",
                None,
                Some(json!({"nombreUsuario": "ana", "password": "wrong"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_customer_cannot_read_others_or_promote_self() {
        let app = TestApp::new();
        let (ana, token) = app.user_token("ana", Role::Customer).await;
        let (luis, _) = app.user_token("luis", Role::Customer).await;

        let (status, _, _) = app
            .send("GET", &format!("/api/usuarios/{}", luis.id), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, _) = app.send("GET", "/api/usuarios", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, _) = app
            .send(
                "PATCH",
                &format!("/api/usuarios/{}", ana.id),
                Some(&token),
                Some(json!({"id": ana.id, "rol": 1})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let stored = UserRepository::get(&app.store, ana.id).await.unwrap().unwrap();
        assert_eq!(stored.role, Role::Customer);
    }

    #[tokio::test]
    async fn test_update_profile_and_admin_delete() {
        let app = TestApp::new();
        let (ana, token) = app.user_token("ana", Role::Customer).await;
        let (_, admin) = app.user_token("admin", Role::Admin).await;

        let (status, _, _) = app
            .send(
                "PATCH",
                &format!("/api/usuarios/{}", ana.id),
                Some(&token),
                Some(json!({"id": ana.id, "direccion": "Carrera 7"})),
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let stored = UserRepository::get(&app.store, ana.id).await.unwrap().unwrap();
        assert_eq!(stored.address, "Carrera 7");
        assert_eq!(stored.email, ana.email);

        let (status, _, _) = app
            .send("DELETE", &format!("/api/usuarios/{}", ana.id), Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _, _) = app
            .send("GET", &format!("/api/usuarios/{}", ana.id), Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
