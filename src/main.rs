use std::net::SocketAddr;

use gva_hub::{config::Config, db, search, socket::Hub, AppState};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let db_pool = db::connect(&config.database_url).await?;
    let search = search::connect(&config.search).await;
    let hub = Hub::spawn(config.socket.send_buffer);

    let app = gva_hub::app(AppState {
        db_pool,
        hub,
        search,
        socket: config.socket,
    });

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(event = "server_started", addr = %listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown())
        .await?;

    info!(event = "server_stopped");
    Ok(())
}

async fn shutdown() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
