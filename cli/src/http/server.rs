//! HTTP server lifecycle for the tool surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::broadcast;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use spector_core::api::{AppConfig, CliError};

use crate::app::build_engine;
use crate::commands::cli::ServeArgs;
use crate::http::routes::create_router;
use crate::http::state::AppState;
use crate::registry::{SetupRegistry, SetupSpec};

/// Synchronous verification calls hold the connection for the whole run;
/// the request timeout has to cover queueing plus a full trajectory.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3600);

pub async fn handle_serve(args: ServeArgs, cfg: AppConfig) -> Result<(), CliError> {
    let registry = Arc::new(SetupRegistry::new());
    if let Some(path) = args.setup.as_deref() {
        let spec =
            SetupSpec::load(path).map_err(|e| CliError::Config(format!("setup file: {e}")))?;
        let id = registry.add_setup(spec);
        info!(setup_id = id, "setup loaded into registry");
    }

    let engine = build_engine(&cfg)?;
    let (shutdown_tx, _) = broadcast::channel(1);
    let state = AppState::new(engine.scheduler, registry, shutdown_tx.clone());

    let host = if args.host == "127.0.0.1" {
        cfg.http_server.host.clone()
    } else {
        args.host.clone()
    };
    let port = if args.port == 8750 {
        cfg.http_server.port
    } else {
        args.port
    };

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| CliError::Config(format!("invalid listen address: {e}")))?;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(CliError::Io)?;
    info!("tool surface listening on http://{addr}");

    let mut shutdown_rx = shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("received Ctrl+C");
                }
                _ = shutdown_rx.recv() => {
                    info!("received shutdown request over the API");
                }
                _ = wait_for_sigterm() => {
                    info!("received SIGTERM");
                }
            }
            info!("starting graceful shutdown");
        })
        .await
        .map_err(CliError::Io)?;

    info!("server shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(error.message = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
