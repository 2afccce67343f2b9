use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use simdock_dispatcher::config::ServerConfig;
use simdock_dispatcher::router::build_app_router;
use simdock_dispatcher::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "simdock-dispatcher", version)]
#[command(about = "Queue dispatcher for long-running simulation jobs")]
struct Args {}

#[tokio::main]
async fn main() {
    Args::parse();
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simdock_dispatcher=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dispatcher starting");

    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        staging = %config.staging_root.display(),
        results = %config.results_root.display(),
        "loaded configuration",
    );

    let pool = simdock_db::create_pool(&config.database_url)
        .await
        .expect("Failed to open queue store");
    simdock_db::run_migrations(&pool)
        .await
        .expect("Failed to run queue store migrations");
    simdock_db::health_check(&pool)
        .await
        .expect("Queue store health check failed");
    tracing::info!(database = %config.database_url, "queue store ready");

    tokio::fs::create_dir_all(&config.staging_root)
        .await
        .expect("Failed to create staging root");
    tokio::fs::create_dir_all(&config.results_root)
        .await
        .expect("Failed to create results root");

    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    let grace = Duration::from_secs(config.shutdown_grace_secs);

    let state = AppState::new(pool, config);
    let shutdown = state.shutdown.clone();
    tokio::spawn(signal_listener(shutdown.clone()));

    let app = build_app_router(state);

    tracing::info!(%addr, "dispatcher listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let drain_token = shutdown.clone();
    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { drain_token.cancelled().await })
            .await
    };

    // Once the shutdown token trips, in-flight handlers get a short
    // grace period to drain before the process exits anyway.
    tokio::select! {
        result = server => result.expect("Server error"),
        () = async {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        } => {
            tracing::warn!("shutdown grace period elapsed with handlers still in flight");
        }
    }

    tracing::info!("dispatcher stopped");
}

/// Translate SIGINT/SIGTERM into the shared shutdown token, so signals
/// and the `Shutdown` command drive the same path.
async fn signal_listener(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }

    token.cancel();
}
