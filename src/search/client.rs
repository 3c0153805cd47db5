use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use reqwest::{header::CONTENT_TYPE, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::config::SearchConfig;

const SCROLL_KEEPALIVE: &str = "2m";

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("no search engine address configured")]
    NoAddresses,
    #[error("invalid search engine address {0:?}")]
    InvalidAddress(String),
    #[error("invalid index or document id {0:?}")]
    InvalidSegment(String),
    #[error("page {page} of size {page_size} is out of range")]
    PageOutOfRange { page: i64, page_size: i64 },
    #[error("document {id} not found in {index}")]
    NotFound { index: String, id: String },
    #[error("search engine replied {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("search engine request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid search payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed search engine reply: {0}")]
    Malformed(&'static str),
    #[error("bulk document without an id")]
    MissingId,
    #[error("bulk request partially failed")]
    BulkRejected,
}

impl SearchError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Status { status, .. } => *status == StatusCode::NOT_FOUND,
            _ => false,
        }
    }

    fn for_document(self, index: &str, id: &str) -> Self {
        if self.is_not_found() {
            Self::NotFound {
                index: index.to_owned(),
                id: id.to_owned(),
            }
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchRequest {
    pub query: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<Value>,
}

impl SearchRequest {
    pub fn new(query: Value) -> Self {
        Self {
            query,
            ..Default::default()
        }
    }

    /// Page `page` (1-based) of `page_size` hits. Offsets past `usize` are refused.
    pub fn paged(query: Value, page: i64, page_size: i64) -> Result<Self, SearchError> {
        let out_of_range = || SearchError::PageOutOfRange { page, page_size };
        let from = page
            .checked_sub(1)
            .and_then(|skipped| skipped.checked_mul(page_size))
            .and_then(|from| usize::try_from(from).ok())
            .ok_or_else(out_of_range)?;
        let size = usize::try_from(page_size).map_err(|_| out_of_range())?;

        Ok(Self {
            from: Some(from),
            size: Some(size),
            ..Self::new(query)
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub hits: Hits,
    #[serde(rename = "_scroll_id", default, skip_serializing_if = "Option::is_none")]
    pub scroll_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub total: TotalHits,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TotalHits {
    pub value: u64,
    #[serde(default)]
    pub relation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<Map<String, Value>>,
}

impl SearchResponse {
    pub fn total(&self) -> u64 {
        self.hits.total.value
    }

    pub fn into_sources(self) -> Vec<Value> {
        self.hits.hits.into_iter().map(|hit| hit.source).collect()
    }
}

/// Thin JSON-over-HTTP wrapper around an Elasticsearch cluster.
///
/// Requests rotate across the configured addresses. Nothing is retried.
#[derive(Debug, Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    addresses: Arc<[Url]>,
    cursor: Arc<AtomicUsize>,
    credentials: Option<(String, Option<String>)>,
}

impl SearchClient {
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        if config.addresses.is_empty() {
            return Err(SearchError::NoAddresses);
        }
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        let addresses = config
            .addresses
            .iter()
            .map(|addr| {
                Url::parse(addr)
                    .ok()
                    .filter(|url| !url.cannot_be_a_base())
                    .ok_or_else(|| SearchError::InvalidAddress(addr.clone()))
            })
            .collect::<Result<Arc<[Url]>, _>>()?;

        Ok(Self {
            http,
            addresses,
            cursor: Arc::new(AtomicUsize::new(0)),
            credentials: config.username.clone().map(|user| (user, config.password.clone())),
        })
    }

    /// Each segment is percent-encoded on its own, so ids never add path levels.
    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, SearchError> {
        if let Some(segment) = segments.iter().find(|segment| matches!(**segment, "" | "." | "..")) {
            return Err(SearchError::InvalidSegment((*segment).to_owned()));
        }

        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % self.addresses.len();
        let mut url = self.addresses[slot].clone();
        if !segments.is_empty() {
            if let Ok(mut path) = url.path_segments_mut() {
                path.pop_if_empty().extend(segments);
            }
        }

        let builder = self.http.request(method, url);
        Ok(match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, password.as_ref()),
            None => builder,
        })
    }

    async fn send(builder: RequestBuilder) -> Result<Response, SearchError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SearchError::Status { status, body })
    }

    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, SearchError> {
        Ok(Self::send(builder).await?.json().await?)
    }

    pub async fn info(&self) -> Result<Value, SearchError> {
        Self::send_json(self.request(Method::GET, &[])?).await
    }

    /// Indexes and refreshes; without an id the engine assigns one.
    pub async fn index_document<T: Serialize + ?Sized>(
        &self,
        index: &str,
        id: Option<&str>,
        document: &T,
    ) -> Result<(), SearchError> {
        let id = id.filter(|id| !id.is_empty());
        let builder = match id {
            Some(id) => self.request(Method::PUT, &[index, "_doc", id])?,
            None => self.request(Method::POST, &[index, "_doc"])?,
        };
        Self::send(builder.query(&[("refresh", "true")]).json(document)).await?;

        debug!(event = "document_indexed", index, id = id.unwrap_or_default());
        Ok(())
    }

    pub async fn get_document<T: DeserializeOwned>(&self, index: &str, id: &str) -> Result<T, SearchError> {
        let mut body: Value = Self::send_json(self.request(Method::GET, &[index, "_doc", id])?)
            .await
            .map_err(|err| err.for_document(index, id))?;

        let source = body
            .get_mut("_source")
            .map(Value::take)
            .ok_or(SearchError::Malformed("document without _source"))?;
        Ok(serde_json::from_value(source)?)
    }

    pub async fn update_document<T: Serialize + ?Sized>(
        &self,
        index: &str,
        id: &str,
        partial: &T,
    ) -> Result<(), SearchError> {
        let builder = self
            .request(Method::POST, &[index, "_update", id])?
            .query(&[("refresh", "true")])
            .json(&json!({ "doc": partial }));
        Self::send(builder).await.map_err(|err| err.for_document(index, id))?;
        Ok(())
    }

    pub async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchError> {
        let builder = self
            .request(Method::DELETE, &[index, "_doc", id])?
            .query(&[("refresh", "true")]);
        Self::send(builder).await.map_err(|err| err.for_document(index, id))?;
        Ok(())
    }

    pub async fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let builder = self
            .request(Method::POST, &[index, "_search"])?
            .query(&[("track_total_hits", "true")])
            .json(request);
        Self::send_json(builder).await
    }

    pub async fn highlight_search(
        &self,
        index: &str,
        query: Value,
        fields: &[&str],
    ) -> Result<SearchResponse, SearchError> {
        let fields: Map<String, Value> = fields
            .iter()
            .map(|field| ((*field).to_owned(), json!({})))
            .collect();
        let request = SearchRequest {
            highlight: Some(json!({ "fields": fields })),
            ..SearchRequest::new(query)
        };
        self.search(index, &request).await
    }

    pub async fn create_index(&self, index: &str, mapping: Option<&Value>) -> Result<(), SearchError> {
        let builder = self.request(Method::PUT, &[index])?;
        let builder = match mapping {
            Some(mapping) => builder.json(mapping),
            None => builder,
        };
        Self::send(builder).await?;

        info!(event = "index_created", index);
        Ok(())
    }

    pub async fn delete_index(&self, index: &str) -> Result<(), SearchError> {
        Self::send(self.request(Method::DELETE, &[index])?).await?;

        info!(event = "index_deleted", index);
        Ok(())
    }

    pub async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        let response = self.request(Method::HEAD, &[index])?.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(SearchError::Status {
                status,
                body: String::new(),
            }),
        }
    }

    pub async fn refresh(&self, indices: &[&str]) -> Result<(), SearchError> {
        let joined = indices.join(",");
        let path = if indices.is_empty() {
            vec!["_refresh"]
        } else {
            vec![joined.as_str(), "_refresh"]
        };
        Self::send(self.request(Method::POST, &path)?).await?;
        Ok(())
    }

    pub async fn get_index_mapping(&self, index: &str) -> Result<Value, SearchError> {
        Self::send_json(self.request(Method::GET, &[index, "_mapping"])?).await
    }

    pub async fn update_index_mapping(&self, index: &str, mapping: &Value) -> Result<(), SearchError> {
        Self::send(self.request(Method::PUT, &[index, "_mapping"])?.json(mapping)).await?;
        Ok(())
    }

    /// Every document must carry an `id`, which becomes its `_id` and is stripped from the body.
    pub async fn bulk_index(&self, index: &str, documents: Vec<Map<String, Value>>) -> Result<(), SearchError> {
        if documents.is_empty() {
            return Ok(());
        }

        let count = documents.len();
        let mut body = String::new();
        for mut document in documents {
            let id = match document.remove("id").ok_or(SearchError::MissingId)? {
                Value::String(id) => id,
                other => other.to_string(),
            };
            body.push_str(&serde_json::to_string(&json!({ "index": { "_index": index, "_id": id } }))?);
            body.push('\n');
            body.push_str(&serde_json::to_string(&document)?);
            body.push('\n');
        }

        let builder = self
            .request(Method::POST, &["_bulk"])?
            .query(&[("refresh", "true")])
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        let reply: Value = Self::send_json(builder).await?;
        if reply.get("errors").and_then(Value::as_bool).unwrap_or(false) {
            return Err(SearchError::BulkRejected);
        }

        info!(event = "bulk_indexed", index, count);
        Ok(())
    }

    pub async fn count(&self, index: &str, query: Option<Value>) -> Result<u64, SearchError> {
        let builder = self.request(Method::POST, &[index, "_count"])?;
        let builder = match query {
            Some(query) => builder.json(&json!({ "query": query })),
            None => builder,
        };
        let reply: Value = Self::send_json(builder).await?;
        reply
            .get("count")
            .and_then(Value::as_u64)
            .ok_or(SearchError::Malformed("count reply without count"))
    }

    pub async fn multi_search(&self, searches: &[(&str, Value)]) -> Result<Vec<SearchResponse>, SearchError> {
        let mut body = String::new();
        for (index, query) in searches {
            body.push_str(&serde_json::to_string(&json!({ "index": index }))?);
            body.push('\n');
            body.push_str(&serde_json::to_string(&json!({ "query": query }))?);
            body.push('\n');
        }

        #[derive(Deserialize)]
        struct Responses {
            responses: Vec<SearchResponse>,
        }

        let builder = self
            .request(Method::POST, &["_msearch"])?
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        let Responses { responses } = Self::send_json(builder).await?;
        Ok(responses)
    }

    /// Runs `aggs` without fetching hits and returns the `aggregations` object.
    pub async fn aggregate(&self, index: &str, aggs: Value) -> Result<Map<String, Value>, SearchError> {
        let builder = self
            .request(Method::POST, &[index, "_search"])?
            .json(&json!({ "size": 0, "aggs": aggs }));
        let mut reply: Value = Self::send_json(builder).await?;
        match reply.get_mut("aggregations").map(Value::take) {
            Some(Value::Object(aggregations)) => Ok(aggregations),
            _ => Err(SearchError::Malformed("search reply without aggregations")),
        }
    }

    /// Pages through every match, handing each non-empty batch of sources to `each`.
    pub async fn scroll_search<F, E>(&self, index: &str, query: Value, size: usize, mut each: F) -> Result<(), E>
    where
        F: FnMut(Vec<Value>) -> Result<(), E>,
        E: From<SearchError>,
    {
        let builder = self
            .request(Method::POST, &[index, "_search"])?
            .query(&[("scroll", SCROLL_KEEPALIVE)])
            .json(&json!({ "query": query, "size": size }));
        let first: SearchResponse = Self::send_json(builder).await?;

        let mut scroll_id = first.scroll_id.clone();
        let mut batch = first.into_sources();
        let result = loop {
            if batch.is_empty() {
                break Ok(());
            }
            if let Err(err) = each(std::mem::take(&mut batch)) {
                break Err(err);
            }
            let Some(id) = scroll_id.as_deref() else {
                break Ok(());
            };
            match self.scroll_page(id).await {
                Ok(page) => {
                    if page.scroll_id.is_some() {
                        scroll_id = page.scroll_id.clone();
                    }
                    batch = page.into_sources();
                }
                Err(err) => break Err(E::from(err)),
            }
        };

        if let Some(id) = scroll_id {
            if let Err(err) = self.clear_scroll(&id).await {
                debug!(event = "scroll_clear_failed", error = %err);
            }
        }
        result
    }

    async fn scroll_page(&self, scroll_id: &str) -> Result<SearchResponse, SearchError> {
        let builder = self
            .request(Method::POST, &["_search", "scroll"])?
            .json(&json!({ "scroll": SCROLL_KEEPALIVE, "scroll_id": scroll_id }));
        Self::send_json(builder).await
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), SearchError> {
        let builder = self
            .request(Method::DELETE, &["_search", "scroll"])?
            .json(&json!({ "scroll_id": scroll_id }));
        Self::send(builder).await?;
        Ok(())
    }

    /// Term suggestions for `text` against `field`.
    pub async fn suggest(&self, index: &str, field: &str, text: &str) -> Result<Vec<String>, SearchError> {
        let builder = self.request(Method::POST, &[index, "_search"])?.json(&json!({
            "size": 0,
            "suggest": { "suggestion": { "text": text, "term": { "field": field } } },
        }));
        let reply: Value = Self::send_json(builder).await?;

        let entries = reply
            .pointer("/suggest/suggestion")
            .and_then(Value::as_array)
            .ok_or(SearchError::Malformed("search reply without suggestions"))?;
        Ok(entries
            .iter()
            .filter_map(|entry| entry.get("options").and_then(Value::as_array))
            .flatten()
            .filter_map(|option| option.get("text").and_then(Value::as_str))
            .map(str::to_owned)
            .collect())
    }

    pub async fn reindex(&self, source: &str, dest: &str) -> Result<(), SearchError> {
        let builder = self
            .request(Method::POST, &["_reindex"])?
            .json(&json!({ "source": { "index": source }, "dest": { "index": dest } }));
        Self::send(builder).await?;

        info!(event = "reindexed", source, dest);
        Ok(())
    }
}
