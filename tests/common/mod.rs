#![allow(dead_code)]

use std::net::SocketAddr;

use gva_hub::{config::SocketConfig, db, search::SearchClient, socket::Hub, AppState};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::net::TcpListener;

/// A private in-memory database; one connection keeps it alive.
pub async fn memory_pool() -> SqlitePool {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::migrate(&db_pool).await.unwrap();
    db_pool
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub hub: Hub,
    pub db_pool: SqlitePool,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn spawn_server(socket: SocketConfig, search: Option<SearchClient>) -> TestServer {
    let db_pool = memory_pool().await;
    let hub = Hub::spawn(socket.send_buffer);
    let app = gva_hub::app(AppState {
        db_pool: db_pool.clone(),
        hub: hub.clone(),
        search,
        socket,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });

    TestServer { addr, hub, db_pool }
}
