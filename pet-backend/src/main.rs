mod api;
mod config;
mod registry;

use anyhow::Result;
use poem::listener::TcpListener;
use poem::middleware::Cors;
use poem::{EndpointExt, Route, Server};
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pet_backend=info,poem=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "backend.toml".to_string());

    tracing::info!("Loading configuration from: {}", config_path);

    let config = config::ConfigFile::load(&config_path)?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let registry = Arc::new(registry::Registry::from_config(config));

    let api_service = api::service(registry).server(format!("http://{}", addr));
    let ui = api_service.scalar();
    let spec = api_service.spec_endpoint();

    // Pages call in from arbitrary origins
    let app = Route::new()
        .nest("/", api_service)
        .nest("/docs", ui)
        .nest("/spec", spec)
        .with(Cors::new());

    tracing::info!("Pet backend listening on {}", addr);
    tracing::info!("API documentation: http://{}/docs", addr);

    Server::new(TcpListener::bind(&addr))
        .run_with_graceful_shutdown(app, shutdown_signal(), None)
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
