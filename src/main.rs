use coin_tracker::{
    AppState, Config,
    clock::{Clock, SystemClock},
    remote::{BlobStore, JsonBinClient},
    router,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env();
    let remote: Option<Arc<dyn BlobStore>> = match &config.remote {
        Some(remote) => {
            info!("syncing against {}", remote.base_url);
            Some(Arc::new(JsonBinClient::new(remote)?))
        }
        None => {
            warn!("BLOB_API_URL not set, running local-only");
            None
        }
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let state = AppState::start(&config, remote, clock).await?;
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
