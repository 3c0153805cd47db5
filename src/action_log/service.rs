use rand::{seq::IndexedRandom, Rng};
use serde_json::{json, Map, Value};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::search::{
    ensure_index,
    query::{self, BoolQuery},
    SearchClient, SearchError, SearchRequest,
};

use super::model::{mapping, LogPage, LogSearch, LogStats, StatsQuery, UserActionLog, INDEX};

const STATS_BUCKETS: usize = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Creates the log index with its mapping. Returns whether it was created.
pub async fn init_index(client: &SearchClient) -> Result<bool, SearchError> {
    let created = ensure_index(client, INDEX, &mapping()).await?;
    if !created {
        info!(event = "index_exists", index = INDEX);
    }
    Ok(created)
}

pub async fn create_log(client: &SearchClient, log: &UserActionLog) -> Result<(), SearchError> {
    client.index_document(INDEX, Some(log.id.as_str()), log).await?;
    info!(event = "action_logged", id = %log.id, action = %log.action);
    Ok(())
}

pub async fn get_log(client: &SearchClient, id: &str) -> Result<UserActionLog, SearchError> {
    client.get_document(INDEX, id).await
}

pub async fn delete_log(client: &SearchClient, id: &str) -> Result<(), SearchError> {
    client.delete_document(INDEX, id).await?;
    info!(event = "action_log_deleted", id);
    Ok(())
}

pub async fn delete_index(client: &SearchClient) -> Result<(), SearchError> {
    client.delete_index(INDEX).await
}

pub fn build_query(search: &LogSearch) -> Value {
    let mut filters = BoolQuery::default();
    let must = &mut filters.must;

    if let Some(user_id) = search.user_id {
        must.push(query::term("user_id", user_id));
    }
    if !search.username.is_empty() {
        must.push(query::match_query("username", &search.username));
    }
    for (field, value) in [
        ("action", &search.action),
        ("module", &search.module),
        ("method", &search.method),
        ("ip", &search.ip),
    ] {
        if !value.is_empty() {
            must.push(query::term(field, value));
        }
    }
    if let Some(status) = search.status {
        must.push(query::term("status", status));
    }
    if !search.start_time.is_empty() || !search.end_time.is_empty() {
        must.push(time_range(&search.start_time, &search.end_time));
    }
    if !search.keyword.is_empty() {
        let keyword = BoolQuery {
            should: vec![
                query::match_query("path", &search.keyword),
                query::match_query("error_msg", &search.keyword),
            ],
            minimum_should_match: Some(1),
            ..Default::default()
        };
        must.push(keyword.into_query());
    }

    if filters.is_empty() {
        query::match_all()
    } else {
        filters.into_query()
    }
}

pub fn build_sort(search: &LogSearch) -> Vec<Value> {
    if search.order_field.is_empty() {
        return vec![json!({ "create_time": { "order": "desc" } })];
    }
    let order = if search.order_type == "asc" { "asc" } else { "desc" };
    vec![json!({ search.order_field.as_str(): { "order": order } })]
}

fn time_range(start: &str, end: &str) -> Value {
    let bound = |value: &str| (!value.is_empty()).then(|| value.to_owned());
    query::range("create_time", bound(start), bound(end))
}

pub async fn search_logs(client: &SearchClient, mut search: LogSearch) -> Result<LogPage, SearchError> {
    if search.page < 1 {
        search.page = 1;
    }
    if search.page_size < 1 {
        search.page_size = 10;
    }
    search.page_size = search.page_size.min(MAX_PAGE_SIZE);

    let request = SearchRequest {
        sort: build_sort(&search),
        ..SearchRequest::paged(build_query(&search), search.page, search.page_size)?
    };
    let response = client.search(INDEX, &request).await?;
    let total = response.total();

    let list = response
        .into_sources()
        .into_iter()
        .filter_map(|source| match serde_json::from_value(source) {
            Ok(log) => Some(log),
            Err(err) => {
                warn!(event = "action_log_undecodable", error = %err);
                None
            }
        })
        .collect();

    Ok(LogPage {
        list,
        total,
        page: search.page,
        page_size: search.page_size,
    })
}

pub async fn batch_create_logs(client: &SearchClient, logs: &[UserActionLog]) -> Result<usize, SearchError> {
    let documents = logs
        .iter()
        .map(|log| match serde_json::to_value(log)? {
            Value::Object(document) => Ok(document),
            _ => Err(SearchError::Malformed("log did not serialize to an object")),
        })
        .collect::<Result<Vec<Map<String, Value>>, SearchError>>()?;

    client.bulk_index(INDEX, documents).await?;
    Ok(logs.len())
}

pub async fn get_stats(client: &SearchClient, stats: &StatsQuery) -> Result<LogStats, SearchError> {
    let group_by = if stats.group_by.is_empty() { "action" } else { stats.group_by.as_str() };
    let aggs = json!({
        "group_stats": { "terms": { "field": group_by, "size": STATS_BUCKETS } }
    });
    let aggregations = client.aggregate(INDEX, aggs).await?;

    let buckets = aggregations
        .get("group_stats")
        .and_then(|group| group.get("buckets"))
        .and_then(Value::as_array)
        .map(|buckets| buckets.iter().filter(|bucket| bucket.is_object()).cloned().collect())
        .unwrap_or_default();

    let range = time_range(&stats.start_time, &stats.end_time);
    let total = match client.count(INDEX, Some(range)).await {
        Ok(total) => total,
        Err(err) => {
            warn!(event = "action_log_count_failed", error = %err);
            0
        }
    };

    Ok(LogStats { total, stats: buckets })
}

const USERNAMES: [&str; 5] = ["admin", "alice", "bob", "carol", "dave"];
const ACTIONS: [&str; 6] = ["login", "logout", "create", "update", "delete", "query"];
const MODULES: [&str; 5] = ["user", "role", "menu", "fans_club", "system"];
const METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];
const PATHS: [&str; 5] = [
    "/base/login",
    "/user/getUserList",
    "/fansClub/createFansClub",
    "/fansClubPost/getPostList",
    "/menu/getMenu",
];
const AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0)",
    "curl/8.5.0",
];
const STATUSES: [u16; 5] = [200, 200, 200, 400, 500];

/// Plausible logs spread over the last 30 days, for exercising the search UI.
pub fn random_logs(count: usize, rng: &mut impl Rng) -> Vec<UserActionLog> {
    let now = OffsetDateTime::now_utc();
    (0..count)
        .map(|_| {
            let user = rng.random_range(0..USERNAMES.len());
            let status = *STATUSES.choose(rng).unwrap_or(&200);
            UserActionLog {
                id: Uuid::new_v4().to_string(),
                user_id: user as u64 + 1,
                username: USERNAMES[user].to_owned(),
                action: pick(&ACTIONS, rng),
                module: pick(&MODULES, rng),
                method: pick(&METHODS, rng),
                path: pick(&PATHS, rng),
                ip: format!("192.168.{}.{}", rng.random_range(0..=255), rng.random_range(1..=254)),
                user_agent: pick(&AGENTS, rng),
                status,
                latency: rng.random_range(5..2000),
                request: String::new(),
                response: String::new(),
                error_msg: if status >= 400 { format!("request failed with status {status}") } else { String::new() },
                create_time: now - Duration::seconds(rng.random_range(0..30 * 24 * 3600)),
            }
        })
        .collect()
}

fn pick(options: &[&str], rng: &mut impl Rng) -> String {
    options.choose(rng).copied().unwrap_or_default().to_owned()
}
