use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use swapflow::adapters::{MemoryCache, MemoryJobQueue, MemoryOrderStore, PostgresStore, RedisCache};
use swapflow::api::{create_router, AppState};
use swapflow::cli::{Cli, RunMode};
use swapflow::config::AppConfig;
use swapflow::dex::build_router;
use swapflow::notify::ConnectionManager;
use swapflow::persistence::{OrderCache, OrderRepository, RateLimitStore};
use swapflow::processor::{OrderProcessor, ProcessorSettings};
use swapflow::queue::{JobQueue, WorkerConfig, WorkerPool};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

mod main_runtime;

use main_runtime::{init_logging, shutdown_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)
        .with_context(|| format!("failed to load configuration from {}", cli.config_dir))?;
    let _log_guard = init_logging(&config.logging);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Config error: {}", e);
        }
        anyhow::bail!("invalid configuration: {}", errors.join("; "));
    }

    match cli.mode() {
        RunMode::MigrateOnly => {
            let store =
                PostgresStore::new(&config.database.url, config.database.max_connections).await?;
            store.migrate().await?;
        }
        RunMode::Serve { migrate, in_memory } => {
            run_server(config, cli.port, in_memory, migrate).await?;
        }
    }

    Ok(())
}

type Backends = (
    Arc<dyn OrderRepository>,
    Arc<dyn OrderCache>,
    Arc<dyn RateLimitStore>,
    Arc<dyn JobQueue>,
);

async fn connect_backends(config: &AppConfig, in_memory: bool, migrate: bool) -> anyhow::Result<Backends> {
    if in_memory {
        info!("Using in-memory order store, cache and queue");
        let cache = Arc::new(MemoryCache::new());
        let orders: Arc<dyn OrderRepository> = Arc::new(MemoryOrderStore::new());
        let queue: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::new());
        let rate_limits: Arc<dyn RateLimitStore> = cache.clone();
        return Ok((orders, cache, rate_limits, queue));
    }

    let store = Arc::new(
        PostgresStore::new(&config.database.url, config.database.max_connections)
            .await
            .context("failed to connect to PostgreSQL")?,
    );
    if migrate {
        store.migrate().await?;
    }
    let redis = Arc::new(
        RedisCache::connect(&config.redis.url)
            .await
            .context("failed to connect to Redis")?,
    );

    let orders: Arc<dyn OrderRepository> = store.clone();
    let queue: Arc<dyn JobQueue> = store;
    let rate_limits: Arc<dyn RateLimitStore> = redis.clone();
    Ok((orders, redis, rate_limits, queue))
}

async fn run_server(
    config: AppConfig,
    port: Option<u16>,
    in_memory: bool,
    migrate: bool,
) -> anyhow::Result<()> {
    let (orders, cache, rate_limits, queue) = connect_backends(&config, in_memory, migrate).await?;
    let connections = Arc::new(ConnectionManager::new());

    let router = build_router(&config.dex);
    info!(venues = ?router.venue_names(), "DEX router ready");

    let processor = OrderProcessor::new(
        router,
        orders.clone(),
        cache.clone(),
        connections.clone(),
        ProcessorSettings::from(&config.order_processing),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = WorkerPool::new(
        queue.clone(),
        Arc::new(processor),
        WorkerConfig::from(&config.queue),
    );
    let worker_handle = tokio::spawn(workers.run(shutdown_rx));

    let state = AppState::new(orders, cache, rate_limits, queue, connections, &config);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, port.unwrap_or(config.server.port))
        .parse()
        .context("invalid server address")?;
    let listener = TcpListener::bind(addr).await?;
    info!("API server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("HTTP server stopped, draining workers");
    let _ = shutdown_tx.send(true);
    if let Err(e) = worker_handle.await {
        error!("Worker pool task failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}
