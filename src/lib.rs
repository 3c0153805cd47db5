pub mod action_log;
pub mod appresult;
pub mod auth;
pub mod config;
pub mod db;
pub mod fans_club;
pub mod res;
pub mod search;
pub mod socket;

use axum::{extract::FromRef, middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use appresult::{AppError, AppResult, Reject};

use config::SocketConfig;
use search::SearchClient;
use socket::Hub;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub hub: Hub,
    pub search: Option<SearchClient>,
    pub socket: SocketConfig,
}

pub fn app(state: AppState) -> Router {
    let fans_club = fans_club::router()
        .layer(middleware::from_fn_with_state(state.clone(), action_log::record));

    Router::new()
        .route("/health", get(health))
        .merge(socket::router())
        .merge(fans_club)
        .nest("/elasticsearch", search::router())
        .nest("/userActionLog", action_log::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "websocket-server" }))
}
