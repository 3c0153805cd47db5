use std::{net::SocketAddr, time::Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::header::USER_AGENT,
    middleware::Next,
    response::Response,
};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::{token_from, validate_token, User},
    search::SearchClient,
};

use super::{model::UserActionLog, service};

/// Records every request it wraps as an action log, off the request path.
pub async fn record(State(search): State<Option<SearchClient>>, request: Request, next: Next) -> Response {
    let Some(client) = search else {
        return next.run(request).await;
    };

    let started = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_owned();
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let user = token_from(request.headers()).and_then(|token| validate_token(token).ok());
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default();

    let response = next.run(request).await;

    let log = entry(user, method, path, ip, user_agent, &response, started);
    tokio::spawn(async move {
        if let Err(err) = service::create_log(&client, &log).await {
            warn!(event = "action_log_dropped", path = %log.path, error = %err);
        }
    });

    response
}

fn entry(
    user: Option<User>,
    method: String,
    path: String,
    ip: String,
    user_agent: String,
    response: &Response,
    started: Instant,
) -> UserActionLog {
    let mut segments = path.split('/').filter(|segment| !segment.is_empty());
    let module = segments.next().unwrap_or_default().to_owned();
    let action = segments.last().unwrap_or(module.as_str()).to_owned();
    let status = response.status();

    UserActionLog {
        id: Uuid::new_v4().to_string(),
        user_id: user
            .as_ref()
            .and_then(|user| user.numeric_id().ok())
            .and_then(|id| u64::try_from(id).ok())
            .unwrap_or_default(),
        username: user.map(|user| user.username).unwrap_or_default(),
        action,
        module,
        method,
        path,
        ip,
        user_agent,
        status: status.as_u16(),
        latency: started.elapsed().as_millis() as i64,
        request: String::new(),
        response: String::new(),
        error_msg: if status.is_success() {
            String::new()
        } else {
            status.canonical_reason().unwrap_or_default().to_owned()
        },
        create_time: OffsetDateTime::now_utc(),
    }
}
