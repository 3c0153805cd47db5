mod api;
mod client;
mod hub;
mod message;
mod ws;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub use client::{dispatch, serve};
pub use hub::{ClientHandle, ClientId, Hub, Outbound};
pub use message::{Content, FrameError, Inbound, Message, MessageKind, Presence, PrivateContent, PrivateRequest};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::upgrade))
        .route("/api/online-users", get(api::online_users))
        .route("/api/send-message", post(api::send_message))
}
