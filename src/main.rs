use std::net::SocketAddr;

use forgestudy_backend::config::Config;
use forgestudy_backend::db::DatabaseProxy;
use forgestudy_backend::logging::{init_tracing, LogSettings};
use forgestudy_backend::services::llm_provider::LLMProvider;
use forgestudy_backend::state::AppState;
use forgestudy_backend::workers::WorkerManager;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&LogSettings::from_env(&config.log_level));

    if config.jwt_secret.is_empty() {
        tracing::warn!("JWT_SECRET is empty; every authenticated request will be rejected");
    }

    let db = match DatabaseProxy::connect(&config).await {
        Ok(db) => db,
        Err(err) => {
            tracing::error!(error = %err, "database initialization failed");
            std::process::exit(1);
        }
    };

    let llm = LLMProvider::from_env();
    if !llm.is_available() {
        tracing::warn!("LLM_API_KEY not set; AI generation endpoints will return 503");
    }

    let worker_manager = match WorkerManager::new(db.clone()).await {
        Ok(manager) => {
            if let Err(e) = manager.start().await {
                tracing::error!(error = %e, "failed to start workers");
            }
            Some(manager)
        }
        Err(e) => {
            tracing::warn!(error = %e, "worker manager not initialized");
            None
        }
    };

    let addr = config.bind_addr();
    let state = AppState::new(config, db.clone(), llm);
    let app = forgestudy_backend::build_router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%addr, error = %err, "failed to bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "forgestudy backend listening");

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        tracing::error!(error = %e, "server error");
    }

    tracing::info!("HTTP server stopped, initiating graceful shutdown sequence");

    if let Some(ref manager) = worker_manager {
        manager.stop().await;
    }
    db.close().await;

    tracing::info!("Graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
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
}
