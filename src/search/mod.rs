mod client;
pub mod query;
mod routes;

use axum::{routing::post, Router};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{config::SearchConfig, AppState, Reject};

pub use client::{Hit, Hits, SearchClient, SearchError, SearchRequest, SearchResponse, TotalHits};
pub use routes::{keyword_search, KeywordSearch, PagedDocuments};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search", post(routes::search))
        .route("/index", post(routes::index))
        .route("/get", post(routes::get))
        .route("/update", post(routes::update))
        .route("/delete", post(routes::delete))
}

/// The configured client, or 503 when search is switched off.
pub(crate) fn engine(search: Option<SearchClient>) -> Result<SearchClient, Reject> {
    search.ok_or_else(|| Reject::Unavailable("search engine is not configured".to_owned()))
}

/// Mapping for the general-purpose log index created at startup.
pub fn default_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "@timestamp": { "type": "date" },
                "message": { "type": "text" },
                "level": { "type": "keyword" },
                "logger": { "type": "keyword" },
            }
        }
    })
}

/// Builds the client and checks the cluster. Search stays off when no address is set.
pub async fn connect(config: &SearchConfig) -> Option<SearchClient> {
    if config.addresses.is_empty() {
        info!(event = "search_disabled");
        return None;
    }

    let client = match SearchClient::new(config) {
        Ok(client) => client,
        Err(err) => {
            warn!(event = "search_unavailable", error = %err);
            return None;
        }
    };

    match client.info().await {
        Ok(info) => {
            let version = info
                .pointer("/version/number")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown");
            info!(event = "search_connected", version);
        }
        Err(err) => warn!(event = "search_unreachable", error = %err),
    }

    if let Some(index) = &config.index {
        if let Err(err) = ensure_index(&client, index, &default_mapping()).await {
            warn!(event = "index_setup_failed", index = %index, error = %err);
        }
    }

    Some(client)
}

/// Creates `index` with `mapping` unless it already exists. Returns whether it was created.
pub async fn ensure_index(client: &SearchClient, index: &str, mapping: &Value) -> Result<bool, SearchError> {
    if client.index_exists(index).await? {
        return Ok(false);
    }
    client.create_index(index, Some(mapping)).await?;
    Ok(true)
}
