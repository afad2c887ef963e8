use anyhow::{Context, Result};
use axum::Router;
use files_manager::{
    AppState,
    config::AppConfig,
    db,
    routes::routes::routes,
    services::{
        catalog::Catalog,
        content_store::{ContentStore, FsContentStore},
        derivation::{DerivationWorker, spawn_workers},
        queue::{JobQueue, SqliteJobQueue},
        session::{SessionValidator, SqliteSessions},
    },
};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + run flags ---
    let (cfg, flags) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting files-manager with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url, 5).await?);

    // --- Schema (idempotent) ---
    db::run_migrations(&db).await?;
    if flags.migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize collaborators ---
    let store: Arc<dyn ContentStore> = Arc::new(
        FsContentStore::new(&cfg.storage_dir)
            .await
            .with_context(|| format!("preparing storage directory {}", cfg.storage_dir))?,
    );
    let queue: Arc<dyn JobQueue> = Arc::new(SqliteJobQueue::new(db.clone(), cfg.queue_config()));
    let sessions: Arc<dyn SessionValidator> = Arc::new(SqliteSessions::new(db.clone()));

    let shutdown = CancellationToken::new();

    // --- Start derivation workers ---
    let workers = if flags.no_worker {
        tracing::info!("Derivation workers disabled");
        Vec::new()
    } else {
        let worker = DerivationWorker::new(Catalog::new(db.clone()), store.clone());
        tracing::info!(count = cfg.workers, "Starting derivation workers");
        spawn_workers(worker, queue.clone(), cfg.workers, shutdown.clone())
    };

    // --- Build router ---
    let state = AppState::new(db.clone(), store, queue, sessions);
    let app: Router = routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", err);
            }
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        })
        .await?;

    // --- Drain workers ---
    shutdown.cancel();
    for result in futures::future::join_all(workers).await {
        if let Err(err) = result {
            tracing::error!("Derivation worker panicked: {}", err);
        }
    }

    db.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
