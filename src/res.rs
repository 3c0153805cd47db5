use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value};

pub const OK: i32 = 0;
pub const FAIL: i32 = 7;

/// The admin panel's response envelope.
#[derive(Debug, Serialize)]
pub struct Reply<T> {
    pub code: i32,
    pub data: T,
    pub msg: String,
}

pub fn ok_with_data<T: Serialize>(data: T) -> Json<Reply<T>> {
    Json(Reply {
        code: OK,
        data,
        msg: "success".to_owned(),
    })
}

pub fn ok_with_message(msg: impl Into<String>) -> Json<Reply<Value>> {
    Json(Reply {
        code: OK,
        data: Value::Object(Map::new()),
        msg: msg.into(),
    })
}

pub fn ok() -> Json<Reply<Value>> {
    ok_with_message("success")
}
