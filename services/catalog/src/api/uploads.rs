use super::AppState;
use crate::auth::AdminUser;
use crate::error::{ApiError, ApiResult};
use crate::upload_guard::UploadResponse;
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    Json,
};
use tracing::{debug, instrument, warn};

/// Form field carrying the model file
const FILE_FIELD: &str = "file";

/// A tripped body limit is reported as such, anything else as a bad form
fn multipart_error(context: &str, err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!(error = %err.body_text(), "Upload exceeds the request body limit");
        return ApiError::PayloadTooLarge(
            "File exceeds the maximum upload size".to_string(),
        );
    }
    ApiError::Validation(format!("{context}: {}", err.body_text()))
}

/// Publish the `file` field of a multipart form as a 3D model
#[instrument(skip(state, multipart))]
pub(super) async fn upload_model(
    State(state): State<AppState>,
    _admin: AdminUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let mut multipart =
        multipart.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Invalid multipart body", e))?
    {
        if field.name() != Some(FILE_FIELD) {
            debug!(field = ?field.name(), "Skipping multipart field");
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let body = field
            .bytes()
            .await
            .map_err(|e| multipart_error("Failed to read file", e))?;

        return state.uploads.upload(&file_name, body).await.map(Json);
    }

    Err(ApiError::Validation("No file provided".to_string()))
}

#[cfg(test)]
mod tests {
    use crate::api::tests::TestApp;
    use crate::config::ApiConfig;
    use crate::models::Role;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};

    const BOUNDARY: &str = "XBOUNDARY";

    fn upload_request(token: &str, file_name: &str, content: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: model/gltf-binary\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_body_over_limit_is_payload_too_large() {
        let app = TestApp::with_config(ApiConfig {
            max_body_bytes: 1024,
            ..ApiConfig::default()
        });
        let (_, admin) = app.user_token("admin", Role::Admin).await;

        let (status, _, response) = app
            .dispatch(upload_request(&admin, "small.glb", &[7u8; 256]))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["fileName"], "small.glb");

        let (status, _, response) = app
            .dispatch(upload_request(&admin, "big.glb", &[7u8; 2048]))
            .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response["code"], "PAYLOAD_TOO_LARGE");
        assert!(app.objects.get("models", "big.glb").await.is_none());
    }

    #[tokio::test]
    async fn test_file_just_above_default_cap_is_rejected() {
        let app = TestApp::new();
        let (_, admin) = app.user_token("admin", Role::Admin).await;
        let content = vec![0u8; ApiConfig::default().max_body_bytes + 1];

        let (status, _, response) = app
            .dispatch(upload_request(&admin, "huge.glb", &content))
            .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response["code"], "PAYLOAD_TOO_LARGE");
        assert!(app.objects.get("models", "huge.glb").await.is_none());
    }
}
