use std::sync::Arc;

use auth_core::config::Config;
use auth_core::services::{Database, JwtService, ServiceError};
use auth_core::{build_router, init_tracing, AppState};

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    let config = Config::from_env()?;
    init_tracing(&config);

    tracing::info!(
        service = %config.service_name,
        environment = ?config.environment,
        "Starting"
    );

    let private_pem = tokio::fs::read(&config.jwt.private_key_path)
        .await
        .map_err(|e| ServiceError::Config(anyhow::anyhow!("Cannot read private key: {e}")))?;
    let public_pem = tokio::fs::read(&config.jwt.public_key_path)
        .await
        .map_err(|e| ServiceError::Config(anyhow::anyhow!("Cannot read public key: {e}")))?;
    let jwt = JwtService::new(&private_pem, &public_pem, config.jwt.issuer.clone())?;

    let database = Database::connect(&config.database.url, config.database.max_connections).await?;
    database.run_migrations().await?;

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::assemble(config, Arc::new(database), jwt);

    state.load_trusted_origins().await?;
    state.spawn_origin_listener();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ServiceError::Config(anyhow::anyhow!("Cannot bind {addr}: {e}")))?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
