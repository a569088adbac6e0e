use crate::AppState;
use crate::api::error::AppError;
use crate::api::middleware::auth::CurrentUser;
use crate::entities::{Role, User};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Deserialize, ToSchema, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 255, message = "Identifier is required"))]
    pub identifier: String,
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password must be between 8 and 128 characters"
    ))]
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::User
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct UpdatePasswordRequest {
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password must be between 8 and 128 characters"
    ))]
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "All users", body = Vec<User>),
        (status = 403, description = "Admin access required")
    ),
    security(("session" = [])),
    tag = "users"
)]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.credentials.list_users().await?))
}

#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid identifier or password"),
        (status = 403, description = "Admin access required"),
        (status = 409, description = "Identifier already exists")
    ),
    security(("session" = [])),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let user = state
        .credentials
        .create_user(&payload.identifier, &payload.password, payload.role)
        .await?;

    tracing::info!("Admin {} created user {}", admin.id, user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    put,
    path = "/users/{id}/password",
    request_body = UpdatePasswordRequest,
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 204, description = "Password changed, sessions revoked"),
        (status = 400, description = "Password rejected"),
        (status = 404, description = "User not found")
    ),
    security(("session" = [])),
    tag = "users"
)]
pub async fn update_password(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<StatusCode, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    state.credentials.update_password(id, &payload.password).await?;
    let revoked = state.sessions.revoke_user(id);
    tracing::info!("Revoked {} sessions of user {} after password change", revoked, id);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/users/{id}/role",
    request_body = UpdateRoleRequest,
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Role updated", body = User),
        (status = 400, description = "Admins cannot demote themselves"),
        (status = 404, description = "User not found")
    ),
    security(("session" = [])),
    tag = "users"
)]
pub async fn update_role(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<User>, AppError> {
    if admin.id == id && payload.role != Role::Admin {
        return Err(AppError::BadRequest(
            "Admins cannot remove their own admin role".to_string(),
        ));
    }

    let user = state.credentials.update_role(id, payload.role).await?;
    Ok(Json(user))
}
