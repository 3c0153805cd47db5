use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::Reject;

pub const INDEX: &str = "user_action_logs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserActionLog {
    pub id: String,
    pub user_id: u64,
    pub username: String,
    pub action: String,
    pub module: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
    /// Skipped when unknown; the `ip` field type rejects empty strings.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub status: u16,
    /// Milliseconds.
    #[serde(default)]
    pub latency: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_msg: String,
    #[serde(with = "time::serde::rfc3339")]
    pub create_time: OffsetDateTime,
}

pub fn mapping() -> Value {
    json!({
        "settings": {
            "number_of_shards": 3,
            "number_of_replicas": 1,
        },
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "user_id": { "type": "long" },
                "username": { "type": "keyword" },
                "action": { "type": "keyword" },
                "module": { "type": "keyword" },
                "method": { "type": "keyword" },
                "path": { "type": "keyword" },
                "ip": { "type": "ip" },
                "user_agent": { "type": "text" },
                "status": { "type": "integer" },
                "latency": { "type": "long" },
                "request": { "type": "text", "index": false },
                "response": { "type": "text", "index": false },
                "error_msg": { "type": "text" },
                "create_time": { "type": "date" },
            }
        }
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLog {
    pub user_id: u64,
    pub username: String,
    pub action: String,
    pub module: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub latency: i64,
    #[serde(default)]
    pub request: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub error_msg: String,
}

impl CreateLog {
    pub fn validate(&self) -> Result<(), Reject> {
        let missing = [
            ("user_id", self.user_id == 0),
            ("username", self.username.trim().is_empty()),
            ("action", self.action.trim().is_empty()),
            ("module", self.module.trim().is_empty()),
        ]
        .into_iter()
        .find_map(|(field, missing)| missing.then_some(field));

        match missing {
            Some(field) => Err(Reject::BadRequest(format!("{field} is required"))),
            None => Ok(()),
        }
    }
}

impl From<CreateLog> for UserActionLog {
    fn from(log: CreateLog) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: log.user_id,
            username: log.username,
            action: log.action,
            module: log.module,
            method: log.method,
            path: log.path,
            ip: log.ip,
            user_agent: log.user_agent,
            status: log.status,
            latency: log.latency,
            request: log.request,
            response: log.response,
            error_msg: log.error_msg,
            create_time: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogSearch {
    pub page: i64,
    #[serde(rename = "pageSize")]
    pub page_size: i64,
    pub user_id: Option<u64>,
    pub username: String,
    pub action: String,
    pub module: String,
    pub method: String,
    pub ip: String,
    pub status: Option<u16>,
    pub start_time: String,
    pub end_time: String,
    pub keyword: String,
    pub order_field: String,
    pub order_type: String,
}

#[derive(Debug, Serialize)]
pub struct LogPage {
    pub list: Vec<UserActionLog>,
    pub total: u64,
    pub page: i64,
    #[serde(rename = "pageSize")]
    pub page_size: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub group_by: String,
}

#[derive(Debug, Serialize)]
pub struct LogStats {
    pub total: u64,
    pub stats: Vec<Value>,
}
