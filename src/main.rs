use std::{sync::Arc, time::Duration};

use tokio::signal;
use tracing_subscriber::EnvFilter;

use docrelay::{
    auth::jwt::JwtService,
    config::AppConfig,
    db,
    default_handlers,
    routes,
    state::AppState,
    storage::{FileStore, LocalFileStore},
    Worker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        webhook_url = %config.webhook_url,
        uploads_dir = %config.uploads_dir,
        "loaded backend configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool)?;

    let local_store = LocalFileStore::new(&config.uploads_dir);
    local_store.ensure_root().await?;
    let files: Arc<dyn FileStore> = Arc::new(local_store);

    let jwt = JwtService::from_config(&config)?;
    let bind_addr = format!("{}:{}", config.server_host, config.server_port);
    let webhook_timeout = Duration::from_secs(config.webhook_timeout_secs);

    let state = AppState::new(pool, config, files, jwt);

    // Dispatch runs in-process: the outbox worker drains the jobs table so
    // uploads never wait on the webhook.
    let worker_state = Arc::new(state.clone());
    let worker = Worker::new(
        worker_state,
        default_handlers(webhook_timeout),
        Duration::from_secs(1),
    );
    tokio::spawn(async move { worker.run().await });

    let router = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            tracing::info!("received shutdown signal");
        })
        .await?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
