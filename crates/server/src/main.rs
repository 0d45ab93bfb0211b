//! Voice orchestrator entry point

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use voicebridge_inference::{InferenceClient, InferenceConfig};
use voicebridge_platform::PlatformClient;
use voicebridge_server::{create_router, AppState, Settings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env();
    init_tracing(&settings.log_level);

    tracing::info!("Starting voicebridge v{}", env!("CARGO_PKG_VERSION"));

    let inference = InferenceClient::new(InferenceConfig {
        base_url: settings.gpu_server_url.clone(),
        api_key: settings.gpu_server_api_key.clone(),
        ..InferenceConfig::default()
    })?;
    let platform = PlatformClient::new(&settings.platform_url, &settings.platform_secret);

    let port = settings.port;
    let state = AppState::new(settings, inference, platform);
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},hyper=warn,tower_http=warn")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
