use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

use crate::common::{ChatMessage, ImageAttachment, PresenceRecord};

/// Inbound JSON text frame, discriminated by its `type` field. Frames with an
/// unrecognized type deserialize to `Unknown` and are dropped by the
/// dispatcher instead of failing the parse.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEnvelope {
    #[serde(rename = "chat_message")]
    ChatMessage(WireMessage),
    #[serde(rename = "status_update")]
    StatusUpdate { users: Vec<PresenceRecord> },
    #[serde(rename = "user_status")]
    UserStatus { username: String, status: String },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error { error: String },
    #[serde(other)]
    Unknown,
}

/// A `chat_message` frame as it appears on the wire. The server duplicates
/// the text under both `message` and `content`, and ids may arrive as
/// numbers or numeric strings depending on who produced the frame.
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub sender: String,
    #[serde(default, deserialize_with = "flexible_id")]
    pub sender_id: Option<i64>,
    #[serde(default, deserialize_with = "flexible_id")]
    pub receiver_id: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub sender_profile_picture: Option<String>,
}

impl WireMessage {
    /// Text body of the message. `message` wins when both fields are present.
    pub fn text(&self) -> &str {
        self.message
            .as_deref()
            .or(self.content.as_deref())
            .unwrap_or("")
    }

    pub fn into_chat_message(self) -> ChatMessage {
        let content = self.text().to_string();
        let timestamp = self
            .timestamp
            .as_deref()
            .and_then(ChatMessage::parse_timestamp)
            .unwrap_or_else(Utc::now);
        ChatMessage {
            sender: self.sender,
            content,
            image_url: self.image_url,
            sender_profile_picture: self.sender_profile_picture,
            timestamp,
        }
    }
}

/// Outbound JSON text frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    #[serde(rename = "chat_message")]
    ChatMessage {
        receiver_id: i64,
        message: String,
        /// Always present; the server treats an empty string as "no image".
        image_base64: String,
    },
    #[serde(rename = "ping")]
    Ping,
}

impl OutboundFrame {
    pub fn chat_message(receiver_id: i64, message: String, image: Option<&ImageAttachment>) -> Self {
        let image_base64 = image
            .map(|attachment| BASE64.encode(&attachment.bytes))
            .unwrap_or_default();
        Self::ChatMessage {
            receiver_id,
            message,
            image_base64,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Accept ids as JSON numbers or as numeric strings (older producers sent the
/// raw form field, which is a string).
fn flexible_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Number(i64),
        Text(String),
    }

    match Option::<IdRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IdRepr::Number(id)) => Ok(Some(id)),
        Some(IdRepr::Text(raw)) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
