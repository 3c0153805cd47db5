use axum::{
    debug_handler,
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    auth::User,
    res::{self, Reply},
    search::{engine, SearchClient},
    AppResult, AppState, Reject,
};

use super::{
    model::{CreateLog, LogPage, LogSearch, LogStats, StatsQuery, UserActionLog},
    service,
};

#[debug_handler(state = AppState)]
pub(crate) async fn init_index(
    _user: User,
    State(search): State<Option<SearchClient>>,
) -> AppResult<Json<Reply<Value>>> {
    let client = engine(search)?;
    let created = service::init_index(&client).await?;

    Ok(res::ok_with_message(if created { "index created" } else { "index already exists" }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_log(
    _user: User,
    State(search): State<Option<SearchClient>>,
    Json(request): Json<CreateLog>,
) -> AppResult<Json<Reply<UserActionLog>>> {
    let client = engine(search)?;
    request.validate()?;

    let log = UserActionLog::from(request);
    service::create_log(&client, &log).await?;
    Ok(res::ok_with_data(log))
}

#[debug_handler(state = AppState)]
pub(crate) async fn get_log(
    _user: User,
    Path(id): Path<String>,
    State(search): State<Option<SearchClient>>,
) -> AppResult<Json<Reply<UserActionLog>>> {
    let client = engine(search)?;
    let log = service::get_log(&client, &id).await?;

    Ok(res::ok_with_data(log))
}

#[debug_handler(state = AppState)]
pub(crate) async fn search_logs(
    _user: User,
    State(search): State<Option<SearchClient>>,
    Json(request): Json<LogSearch>,
) -> AppResult<Json<Reply<LogPage>>> {
    let client = engine(search)?;
    let page = service::search_logs(&client, request).await?;

    Ok(res::ok_with_data(page))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_log(
    _user: User,
    Path(id): Path<String>,
    State(search): State<Option<SearchClient>>,
) -> AppResult<Json<Reply<Value>>> {
    let client = engine(search)?;
    service::delete_log(&client, &id).await?;

    Ok(res::ok_with_message("log deleted"))
}

#[debug_handler(state = AppState)]
pub(crate) async fn get_stats(
    _user: User,
    State(search): State<Option<SearchClient>>,
    Json(request): Json<StatsQuery>,
) -> AppResult<Json<Reply<LogStats>>> {
    let client = engine(search)?;
    if request.start_time.is_empty() || request.end_time.is_empty() {
        return Err(Reject::BadRequest("start_time and end_time are required".to_owned()).into());
    }

    let stats = service::get_stats(&client, &request).await?;
    Ok(res::ok_with_data(stats))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_index(
    user: User,
    State(search): State<Option<SearchClient>>,
) -> AppResult<Json<Reply<Value>>> {
    user.require_admin()?;
    let client = engine(search)?;
    service::delete_index(&client).await?;

    Ok(res::ok_with_message("index deleted"))
}

#[derive(Deserialize)]
pub struct CountQuery {
    pub count: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn batch_create_test_data(
    _user: User,
    State(search): State<Option<SearchClient>>,
    Query(CountQuery { count }): Query<CountQuery>,
) -> AppResult<Json<Reply<Value>>> {
    let client = engine(search)?;
    let count = match count.as_deref() {
        None | Some("") => 100,
        Some(count) => count
            .parse::<usize>()
            .ok()
            .filter(|count| (1..=1000).contains(count))
            .ok_or_else(|| Reject::BadRequest("count must be between 1 and 1000".to_owned()))?,
    };

    let logs = service::random_logs(count, &mut rand::rng());
    let created = service::batch_create_logs(&client, &logs).await?;
    Ok(res::ok_with_message(format!("created {created} test logs")))
}
