#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    response::Response,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::net::SocketAddr;
use server_panel::config::PanelConfig;
use server_panel::entities::{Role, User};
use server_panel::infrastructure::database;
use server_panel::{AppState, create_app};
use tempfile::TempDir;
use tower::ServiceExt;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const ADMIN: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-password";
pub const MAX_UPLOAD: usize = 1024;
pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";

pub struct TestApp {
    pub dir: TempDir,
    pub state: AppState,
    pub app: Router,
    pub admin: User,
}

pub async fn setup() -> TestApp {
    setup_with(|_| {}).await
}

pub async fn setup_with(configure: impl FnOnce(&mut PanelConfig)) -> TestApp {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("server_panel=debug,tower_http=debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();

    let dir = TempDir::new().unwrap();
    let mut config = PanelConfig {
        root_dir: dir.path().join("root"),
        max_upload_size: MAX_UPLOAD,
        blocked_extensions: vec!["exe".to_string()],
        ..PanelConfig::development()
    };
    configure(&mut config);

    let db = database::setup_database(&config.database_url).await.unwrap();
    let state = AppState::new(db, config).unwrap();
    let admin = state
        .credentials
        .create_user(ADMIN, ADMIN_PASSWORD, Role::Admin)
        .await
        .unwrap();
    let app = create_app(state.clone());

    TestApp {
        dir,
        state,
        app,
        admin,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn login(&self, identifier: &str, password: &str) -> Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "identifier": identifier, "password": password })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
    }

    /// Login as seen from a socket peer, with an optional `X-Forwarded-For`.
    pub async fn login_from(
        &self,
        peer: SocketAddr,
        forwarded_for: Option<&str>,
        identifier: &str,
        password: &str,
    ) -> Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header("Content-Type", "application/json")
            .extension(ConnectInfo(peer));
        if let Some(forwarded) = forwarded_for {
            builder = builder.header("X-Forwarded-For", forwarded);
        }
        self.send(
            builder
                .body(Body::from(
                    serde_json::json!({ "identifier": identifier, "password": password })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
    }

    pub async fn token_for(&self, identifier: &str, password: &str) -> String {
        let response = self.login(identifier, password).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        json["session_token"].as_str().unwrap().to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.token_for(ADMIN, ADMIN_PASSWORD).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> Response {
        self.send(
            Request::builder()
                .uri(uri)
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn json_request(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        body: Value,
    ) -> Response {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("Authorization", format!("Bearer {}", token))
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn upload(
        &self,
        token: &str,
        path: &str,
        declared_size: Option<u64>,
        content: &[u8],
    ) -> Response {
        let size = declared_size.map(|s| s.to_string());
        self.upload_declaring(token, path, size.as_deref(), content)
            .await
    }

    /// Upload with the `size` field sent verbatim.
    pub async fn upload_declaring(
        &self,
        token: &str,
        path: &str,
        declared_size: Option<&str>,
        content: &[u8],
    ) -> Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/files/upload")
                .header("Authorization", format!("Bearer {}", token))
                .header(
                    "Content-Type",
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(multipart_body(path, declared_size, content)))
                .unwrap(),
        )
        .await
    }
}

pub fn multipart_body(path: &str, declared_size: Option<&str>, content: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"path\"\r\n\r\n{path}\r\n"
    )
    .into_bytes();
    if let Some(size) = declared_size {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"size\"\r\n\r\n{size}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"upload.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn json_body(response: Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

pub async fn bytes_body(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}
