use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::auth::User;

/// Wire `type` of a message. Unknown kinds survive a round trip untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    Chat,
    Join,
    Leave,
    PrivateMessage,
    SystemMessage,
    Other(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Chat => "chat",
            Self::Join => "user_join",
            Self::Leave => "user_leave",
            Self::PrivateMessage => "private_message",
            Self::SystemMessage => "system_message",
            Self::Other(kind) => kind,
        }
    }
}

impl From<String> for MessageKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "chat" => Self::Chat,
            "user_join" => Self::Join,
            "user_leave" => Self::Leave,
            "private_message" => Self::PrivateMessage,
            "system_message" => Self::SystemMessage,
            _ => Self::Other(kind),
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Other(kind) => kind,
            kind => kind.as_str().to_owned(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_count: usize,
    pub online_users: Vec<User>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateContent {
    pub message: Value,
    /// Sender's display name.
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Presence(Presence),
    Private(PrivateContent),
    Opaque(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub from: User,
    pub content: Content,
    /// Unix seconds, stamped by the server.
    pub time: i64,
}

impl Message {
    pub fn new(kind: MessageKind, from: User, content: Content) -> Self {
        Self {
            kind,
            from,
            content,
            time: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    pub fn system(content: Value) -> Self {
        Self::new(MessageKind::SystemMessage, User::system(), Content::Opaque(content))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: MessageKind,
    #[serde(default)]
    content: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrivateRequest {
    pub target: String,
    #[serde(default)]
    pub message: Value,
}

/// A decoded client frame. Sender and timestamp are never taken from the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Broadcast { kind: MessageKind, content: Value },
    Private(PrivateRequest),
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("private message without a target")]
    MissingTarget,
}

impl Inbound {
    pub fn parse(frame: &[u8]) -> Result<Self, FrameError> {
        let Frame { kind, content } = serde_json::from_slice(frame)?;
        match kind {
            MessageKind::PrivateMessage => {
                let request: PrivateRequest =
                    serde_json::from_value(content).map_err(|_| FrameError::MissingTarget)?;
                if request.target.is_empty() {
                    return Err(FrameError::MissingTarget);
                }
                Ok(Self::Private(request))
            }
            kind => Ok(Self::Broadcast { kind, content }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn kinds_use_wire_names() {
        let value = serde_json::to_value(MessageKind::Join).unwrap();
        assert_eq!(value, json!("user_join"));
        let kind: MessageKind = serde_json::from_value(json!("typing")).unwrap();
        assert_eq!(kind, MessageKind::Other("typing".into()));
        assert_eq!(String::from(kind), "typing");
    }

    #[test]
    fn chat_frames_broadcast_their_content() {
        let inbound = Inbound::parse(br#"{"type":"chat","content":"hi","from":{"id":"spoofed"}}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::Broadcast { kind: MessageKind::Chat, content: json!("hi") }
        );
    }

    #[test]
    fn private_frames_need_a_target() {
        let inbound =
            Inbound::parse(br#"{"type":"private_message","content":{"target":"user_b","message":"psst"}}"#)
                .unwrap();
        assert_eq!(
            inbound,
            Inbound::Private(PrivateRequest { target: "user_b".into(), message: json!("psst") })
        );

        let missing = Inbound::parse(br#"{"type":"private_message","content":{"message":"psst"}}"#);
        assert!(matches!(missing, Err(FrameError::MissingTarget)));
        let not_an_object = Inbound::parse(br#"{"type":"private_message","content":"psst"}"#);
        assert!(matches!(not_an_object, Err(FrameError::MissingTarget)));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(Inbound::parse(b"not json"), Err(FrameError::Json(_))));
        assert!(matches!(Inbound::parse(br#"{"content":1}"#), Err(FrameError::Json(_))));
    }

    #[test]
    fn presence_serializes_camel_case() {
        let message = Message::new(
            MessageKind::Join,
            User::system(),
            Content::Presence(Presence { user_count: 0, online_users: vec![] }),
        );
        let value: Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "user_join");
        assert_eq!(value["content"], json!({ "userCount": 0, "onlineUsers": [] }));
        assert_eq!(value["from"]["role"], "system");
    }
}
