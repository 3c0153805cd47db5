mod model;
mod record;
mod routes;
pub mod service;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::AppState;

pub use model::{mapping, CreateLog, LogPage, LogSearch, LogStats, StatsQuery, UserActionLog, INDEX};
pub use record::record;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/initIndex", post(routes::init_index))
        .route("/createLog", post(routes::create_log))
        .route("/getLog/{id}", get(routes::get_log))
        .route("/searchLogs", post(routes::search_logs))
        .route("/deleteLog/{id}", delete(routes::delete_log))
        .route("/getStats", post(routes::get_stats))
        .route("/deleteIndex", delete(routes::delete_index))
        .route("/batchCreateTestData", post(routes::batch_create_test_data))
}
