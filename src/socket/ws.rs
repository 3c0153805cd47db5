use axum::{
    debug_handler,
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::debug;

use crate::{auth::validate_token, config::SocketConfig, AppState};

use super::{client, Hub};

#[derive(Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Authenticates before upgrading; the token is checked ahead of the handshake headers.
#[debug_handler(state = AppState)]
pub(crate) async fn upgrade(
    Query(WsQuery { token }): Query<WsQuery>,
    State(hub): State<Hub>,
    State(config): State<SocketConfig>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(token) = token.filter(|token| !token.is_empty()) else {
        return (StatusCode::UNAUTHORIZED, "Token required").into_response();
    };
    let user = match validate_token(&token) {
        Ok(user) => user,
        Err(err) => {
            debug!(event = "upgrade_refused", error = %err);
            return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
        }
    };

    match ws {
        Ok(ws) => ws
            .max_message_size(config.max_message_size)
            .on_upgrade(async move |socket| client::serve(socket, hub, user, config).await),
        Err(rejection) => rejection.into_response(),
    }
}
