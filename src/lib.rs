pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::PanelConfig;
use crate::services::credential_store::CredentialStore;
use crate::services::file_service::FileManager;
use crate::services::login_throttle::LoginThrottle;
use crate::services::session::SessionManager;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Room for multipart framing on top of the file limit.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::auth::login,
        api::handlers::auth::logout,
        api::handlers::auth::me,
        api::handlers::files::list_files,
        api::handlers::files::upload_file,
        api::handlers::files::delete_file,
        api::handlers::files::create_directory,
        api::handlers::files::download_file,
        api::handlers::users::list_users,
        api::handlers::users::create_user,
        api::handlers::users::update_password,
        api::handlers::users::update_role,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::auth::LoginRequest,
            api::handlers::auth::LoginResponse,
            api::handlers::files::PathRequest,
            api::handlers::files::OkResponse,
            api::handlers::users::CreateUserRequest,
            api::handlers::users::UpdatePasswordRequest,
            api::handlers::users::UpdateRoleRequest,
            api::handlers::health::HealthResponse,
            services::file_service::FileEntry,
            services::file_service::EntryType,
            entities::users::Model,
            entities::Role,
        )
    ),
    tags(
        (name = "auth", description = "Login and session endpoints"),
        (name = "files", description = "File management inside the panel root"),
        (name = "users", description = "User administration (admin only)"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub credentials: Arc<CredentialStore>,
    pub sessions: Arc<SessionManager>,
    pub files: Arc<FileManager>,
    pub throttle: Arc<LoginThrottle>,
    pub config: PanelConfig,
}

impl AppState {
    /// Wires the stores over an already migrated database.
    pub fn new(db: DatabaseConnection, config: PanelConfig) -> anyhow::Result<Self> {
        let credentials = CredentialStore::new(db.clone())?;
        let sessions = SessionManager::new(credentials.clone(), config.session_ttl());
        let files = FileManager::from_config(&config)?;

        Ok(Self {
            db,
            credentials: Arc::new(credentials),
            sessions: Arc::new(sessions),
            files: Arc::new(files),
            throttle: Arc::new(LoginThrottle::new()),
            config,
        })
    }
}

fn cors_layer(config: &PanelConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn create_app(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/users",
            get(api::handlers::users::list_users).post(api::handlers::users::create_user),
        )
        .route(
            "/users/:id/password",
            put(api::handlers::users::update_password),
        )
        .route("/users/:id/role", put(api::handlers::users::update_role))
        .layer(from_fn(api::middleware::auth::require_admin));

    let protected = Router::new()
        .route("/auth/logout", post(api::handlers::auth::logout))
        .route("/auth/me", get(api::handlers::auth::me))
        .route(
            "/files",
            get(api::handlers::files::list_files).delete(api::handlers::files::delete_file),
        )
        .route(
            "/files/upload",
            post(api::handlers::files::upload_file).layer(DefaultBodyLimit::max(
                state.config.max_upload_size + MULTIPART_OVERHEAD,
            )),
        )
        .route(
            "/files/directories",
            post(api::handlers::files::create_directory),
        )
        .route(
            "/files/download",
            get(api::handlers::files::download_file),
        )
        .merge(admin)
        .layer(from_fn_with_state(
            state.clone(),
            api::middleware::auth::auth_middleware,
        ));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/auth/login", post(api::handlers::auth::login))
        .merge(protected)
        .layer(from_fn(api::middleware::security::security_headers))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
