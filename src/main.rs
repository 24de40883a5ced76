use std::sync::Arc;

use jetgate::accounts::{Account, AccountPool};
use jetgate::cache::CacheService;
use jetgate::config::Config;
use jetgate::metrics::MetricsCore;
use jetgate::pipeline::AppState;
use jetgate::storage::file::FileStorage;
use jetgate::storage::redis_store::RedisStorage;
use jetgate::storage::StorageAdapter;
use jetgate::upstream::UpstreamClient;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            log::error!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };
    let port = config.port;

    let storage: Arc<dyn StorageAdapter> = match &config.redis_url {
        Some(url) => match RedisStorage::connect(url).await {
            Ok(store) => Arc::new(store),
            Err(err) => {
                log::error!("failed to connect to redis, falling back to file storage: {err}");
                Arc::new(FileStorage::new(std::path::PathBuf::from("./jetgate-data")))
            }
        },
        None => Arc::new(FileStorage::new(std::path::PathBuf::from("./jetgate-data"))),
    };

    let accounts: Vec<_> = config
        .accounts
        .iter()
        .enumerate()
        .map(|(i, cfg)| Account::new(format!("account-{i}"), cfg.clone()))
        .collect();
    if accounts.is_empty() {
        log::warn!("no vendor accounts configured; every chat request will fail with 429");
    }

    let state = AppState {
        config: Arc::new(config),
        cache: CacheService::new(),
        accounts: Arc::new(AccountPool::new(accounts)),
        upstream: UpstreamClient::new(),
        metrics: MetricsCore::new(storage),
    };

    let app = jetgate::server::build_router(state);

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(err) => {
            log::error!("failed to bind port {port}: {err}");
            std::process::exit(1);
        }
    };
    log::info!("jetgate listening on port {port}");

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        log::error!("server error: {err}");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining in-flight requests");
}
