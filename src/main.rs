use clap::Parser;
use dotenvy::dotenv;
use server_panel::config::PanelConfig;
use server_panel::infrastructure::{database, seed};
use server_panel::services::worker::BackgroundWorker;
use server_panel::{AppState, create_app};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Web control panel for files on a single host")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Directory to serve (overrides PANEL_ROOT)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Apply production defaults (executable uploads refused)
    #[arg(long)]
    production: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    // Initialize tracing with EnvFilter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "server_panel=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting server panel...");

    let mut config = if args.production {
        PanelConfig::production()
    } else {
        PanelConfig::from_env()
    };
    if let Some(root) = args.root {
        config.root_dir = root;
    }
    info!(
        "🛡️  Panel Config: Root={}, Max Upload={}MB, Session TTL={}s, Blocked={:?}, Trusted Proxies={:?}",
        config.root_dir.display(),
        config.max_upload_size / 1024 / 1024,
        config.session_ttl_secs,
        config.blocked_extensions,
        config.trusted_proxies
    );
    if !config.secure_cookies {
        tracing::warn!("⚠️  Session cookies are not marked Secure");
    }

    let db = database::setup_database(&config.database_url).await?;
    let state = AppState::new(db, config.clone())?;
    info!("📁 Serving files from {}", state.files.root().display());

    seed::seed_admin(
        &state.credentials,
        &config.admin_identifier,
        config.admin_password.as_deref(),
    )
    .await?;

    // Setup Shutdown Channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let worker = BackgroundWorker::new(
        state.sessions.clone(),
        state.throttle.clone(),
        Duration::from_secs(config.session_sweep_secs.max(1)),
        shutdown_rx,
    );
    tokio::spawn(async move {
        worker.run().await;
    });

    let app = create_app(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri().path());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            ),
    );

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    })
    .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
