use crate::AppState;
use crate::api::error::AppError;
use crate::api::middleware::auth::CurrentUser;
use crate::services::file_service::FileEntry;
use axum::{
    Extension, Json,
    body::Body,
    extract::{Multipart, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::{ReaderStream, StreamReader};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PathQuery {
    /// Path relative to the root. Empty lists the root.
    #[serde(default)]
    pub path: String,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct PathRequest {
    #[validate(length(min = 1, max = 4096, message = "Path is required"))]
    pub path: String,
}

#[derive(Serialize, ToSchema)]
pub struct OkResponse {
    pub ok: bool,
}

/// An empty `size` field counts as undeclared.
fn parse_declared_size(text: &str) -> Result<Option<u64>, AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse()
        .map(Some)
        .map_err(|_| AppError::BadRequest("Invalid 'size' field".to_string()))
}

#[utoipa::path(
    get,
    path = "/files",
    params(PathQuery),
    responses(
        (status = 200, description = "Directory listing", body = Vec<FileEntry>),
        (status = 400, description = "Not a directory"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Not found")
    ),
    security(("session" = [])),
    tag = "files"
)]
pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<Json<Vec<FileEntry>>, AppError> {
    let entries = state.files.list(&query.path).await?;
    Ok(Json(entries))
}

#[utoipa::path(
    post,
    path = "/files/upload",
    request_body(
        content = String,
        content_type = "multipart/form-data",
        description = "Fields: path, optional size, file"
    ),
    responses(
        (status = 200, description = "File stored", body = FileEntry),
        (status = 400, description = "Missing path or malformed size"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Parent directory missing"),
        (status = 413, description = "File too large"),
        (status = 415, description = "File type not allowed")
    ),
    security(("session" = [])),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<Json<FileEntry>, AppError> {
    let mut target: Option<String> = None;
    let mut declared_size: Option<u64> = None;
    let mut stored: Option<FileEntry> = None;

    let result: Result<Json<FileEntry>, AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(|e| {
            let err_msg = e.to_string();
            if err_msg.contains("length limit exceeded") {
                AppError::PayloadTooLarge(
                    "Request body exceeds the maximum allowed limit".to_string(),
                )
            } else {
                AppError::BadRequest(err_msg)
            }
        })? {
            let name = field.name().unwrap_or_default().to_string();

            match name.as_str() {
                "path" => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?;
                    target = Some(text);
                }
                "size" => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?;
                    declared_size = parse_declared_size(&text)?;
                }
                "file" => {
                    // The target path must precede the content
                    let path = target.clone().ok_or(AppError::BadRequest(
                        "The 'path' field must precede 'file'".to_string(),
                    ))?;

                    let body_with_io_error = field.map_err(std::io::Error::other);
                    let reader = StreamReader::new(body_with_io_error);

                    stored = Some(state.files.upload(&path, reader, declared_size).await?);
                }
                other => {
                    tracing::debug!("Ignoring unexpected multipart field '{}'", other);
                }
            }
        }

        let entry = stored
            .take()
            .ok_or(AppError::BadRequest("No file provided".to_string()))?;
        Ok(Json(entry))
    }
    .await;

    match result {
        Ok(res) => {
            tracing::info!("User {} uploaded {:?}", user.id, target);
            Ok(res)
        }
        Err(e) => {
            // Drain the rest of the body so the client sees the error instead of a reset
            tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}

#[utoipa::path(
    delete,
    path = "/files",
    request_body = PathRequest,
    responses(
        (status = 200, description = "File deleted", body = OkResponse),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Target is a directory")
    ),
    security(("session" = [])),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<PathRequest>,
) -> Result<Json<OkResponse>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    state.files.delete(&payload.path).await?;
    tracing::info!("User {} deleted {:?}", user.id, payload.path);
    Ok(Json(OkResponse { ok: true }))
}

#[utoipa::path(
    post,
    path = "/files/directories",
    request_body = PathRequest,
    responses(
        (status = 201, description = "Directory created", body = FileEntry),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Parent directory missing"),
        (status = 409, description = "Already exists")
    ),
    security(("session" = [])),
    tag = "files"
)]
pub async fn create_directory(
    State(state): State<AppState>,
    Json(payload): Json<PathRequest>,
) -> Result<(StatusCode, Json<FileEntry>), AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let entry = state.files.create_directory(&payload.path).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[utoipa::path(
    get,
    path = "/files/download",
    params(PathQuery),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Not found")
    ),
    security(("session" = [])),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<Response, AppError> {
    let (entry, file) = state.files.open(&query.path).await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        entry.name.replace(['"', '\\', '\r', '\n'], "_")
    );
    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/octet-stream"),
    );
    if let Some(size) = entry.size_bytes {
        headers.insert(header::CONTENT_LENGTH, header::HeaderValue::from(size));
    }
    if let Ok(value) = header::HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}
