use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{auth::User, AppResult, AppState};

use super::{Hub, Message};

#[debug_handler(state = AppState)]
pub(crate) async fn online_users(State(hub): State<Hub>) -> Json<Value> {
    let users = hub.online_users().await;
    Json(json!({
        "onlineUsers": users,
        "userCount": users.len(),
    }))
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub user_id: String,
    #[serde(default)]
    pub message: Value,
}

#[debug_handler(state = AppState)]
pub(crate) async fn send_message(
    user: User,
    State(hub): State<Hub>,
    Json(SendMessageRequest { user_id, message }): Json<SendMessageRequest>,
) -> AppResult<Json<Value>> {
    user.require_admin()?;
    hub.send_to_user(&user_id, Message::system(message));

    Ok(Json(json!({ "status": "message_sent" })))
}
