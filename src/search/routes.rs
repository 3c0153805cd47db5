use std::{future::Future, time::Duration};

use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    auth::User,
    res::{self, Reply},
    AppResult, AppState, Reject,
};

use super::{engine, query, SearchClient, SearchError, SearchRequest};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_FIELDS: [&str; 2] = ["title", "content"];

#[derive(Debug, Deserialize)]
pub struct KeywordSearch {
    pub index: String,
    pub keyword: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub page_size: i64,
}

#[derive(Debug, Serialize)]
pub struct PagedDocuments {
    pub total: u64,
    pub page: i64,
    pub page_size: i64,
    pub data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct IndexBody {
    pub index: String,
    #[serde(default)]
    pub doc_id: String,
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct DocumentBody {
    pub index: String,
    pub doc_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    pub index: String,
    pub doc_id: String,
    pub updates: Value,
}

/// Keyword search over `fields` with clamped paging.
pub async fn keyword_search(client: &SearchClient, request: KeywordSearch) -> Result<PagedDocuments, SearchError> {
    let page = request.page.max(1);
    let page_size = if (1..=100).contains(&request.page_size) { request.page_size } else { 10 };
    let query = if request.fields.is_empty() {
        query::multi_match(&request.keyword, &DEFAULT_FIELDS[..])
    } else {
        query::multi_match(&request.keyword, request.fields.as_slice())
    };

    let search = SearchRequest::paged(query, page, page_size)?;
    let response = client.search(&request.index, &search).await?;

    Ok(PagedDocuments {
        total: response.total(),
        page,
        page_size,
        data: response.into_sources(),
    })
}

async fn bounded<T>(call: impl Future<Output = Result<T, SearchError>>) -> AppResult<T> {
    let reply = tokio::time::timeout(REQUEST_TIMEOUT, call)
        .await
        .map_err(|_| Reject::Unavailable("search engine timed out".to_owned()))??;
    Ok(reply)
}

fn required(field: &str, value: &str) -> Result<(), Reject> {
    if value.trim().is_empty() {
        return Err(Reject::BadRequest(format!("{field} is required")));
    }
    Ok(())
}

#[debug_handler(state = AppState)]
pub(crate) async fn search(
    _user: User,
    State(search): State<Option<SearchClient>>,
    Json(request): Json<KeywordSearch>,
) -> AppResult<Json<Reply<PagedDocuments>>> {
    let client = engine(search)?;
    required("index", &request.index)?;
    required("keyword", &request.keyword)?;

    let documents = bounded(keyword_search(&client, request)).await?;
    Ok(res::ok_with_data(documents))
}

#[debug_handler(state = AppState)]
pub(crate) async fn index(
    _user: User,
    State(search): State<Option<SearchClient>>,
    Json(IndexBody { index, doc_id, data }): Json<IndexBody>,
) -> AppResult<Json<Reply<Value>>> {
    let client = engine(search)?;
    required("index", &index)?;

    bounded(client.index_document(&index, Some(doc_id.as_str()), &data)).await?;
    Ok(res::ok_with_message("document indexed"))
}

#[debug_handler(state = AppState)]
pub(crate) async fn get(
    _user: User,
    State(search): State<Option<SearchClient>>,
    Json(DocumentBody { index, doc_id }): Json<DocumentBody>,
) -> AppResult<Json<Reply<Value>>> {
    let client = engine(search)?;
    required("index", &index)?;
    required("doc_id", &doc_id)?;

    let document: Value = bounded(client.get_document(&index, &doc_id)).await?;
    Ok(res::ok_with_data(document))
}

#[debug_handler(state = AppState)]
pub(crate) async fn update(
    _user: User,
    State(search): State<Option<SearchClient>>,
    Json(UpdateBody { index, doc_id, updates }): Json<UpdateBody>,
) -> AppResult<Json<Reply<Value>>> {
    let client = engine(search)?;
    required("index", &index)?;
    required("doc_id", &doc_id)?;

    bounded(client.update_document(&index, &doc_id, &updates)).await?;
    Ok(res::ok_with_message("document updated"))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete(
    _user: User,
    State(search): State<Option<SearchClient>>,
    Json(DocumentBody { index, doc_id }): Json<DocumentBody>,
) -> AppResult<Json<Reply<Value>>> {
    let client = engine(search)?;
    required("index", &index)?;
    required("doc_id", &doc_id)?;

    bounded(client.delete_document(&index, &doc_id)).await?;
    Ok(res::ok_with_message("document deleted"))
}
