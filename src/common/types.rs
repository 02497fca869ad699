use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Domain model for a single chat message, regardless of whether it arrived
/// over the realtime channel or from the history endpoint.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub sender: String,
    pub content: String,
    pub image_url: Option<String>,
    pub sender_profile_picture: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Parse a server timestamp. The server emits both RFC 3339 strings with a
    /// trailing `Z` and naive ISO strings without an offset.
    pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Presence entry for one user, as served by `/api/users/` and by
/// `status_update` frames. The server is the source of truth; the client view
/// is fully replaceable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub id: i64,
    pub username: String,
    pub is_online: bool,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

/// The peer whose conversation is currently open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedPeer {
    pub id: i64,
    pub username: String,
}

/// Connection state as surfaced to the UI status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting { attempt: u32, delay_ms: u64 },
    Failed,
}

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// An image picked by the user, not yet uploaded. Bytes are shared so the
/// attachment can travel through channels without copying.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub file_name: String,
    pub bytes: Arc<[u8]>,
}

impl ImageAttachment {
    /// Validate size and extension the same way the composer form does.
    pub fn new(file_name: String, bytes: Vec<u8>) -> Result<Self, String> {
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err("Image too large. Maximum size is 5MB.".to_string());
        }
        let extension = file_name.rsplit('.').next().unwrap_or("").to_lowercase();
        if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err("Please select an image file.".to_string());
        }
        Ok(Self {
            file_name,
            bytes: bytes.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_rfc3339_timestamp() {
        let parsed = ChatMessage::parse_timestamp("2026-03-01T10:15:30.123456Z").unwrap();
        assert_eq!(parsed.hour(), 10);
        assert_eq!(parsed.minute(), 15);
    }

    #[test]
    fn parses_naive_isoformat_timestamp() {
        let parsed = ChatMessage::parse_timestamp("2026-03-01T10:15:30.123456").unwrap();
        assert_eq!(parsed.second(), 30);
    }

    #[test]
    fn rejects_garbage_timestamp() {
        assert!(ChatMessage::parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn attachment_rejects_oversized_image() {
        let err = ImageAttachment::new("big.png".to_string(), vec![0; MAX_IMAGE_BYTES + 1]);
        assert!(err.is_err());
    }

    #[test]
    fn attachment_rejects_non_image_extension() {
        assert!(ImageAttachment::new("notes.txt".to_string(), vec![1, 2, 3]).is_err());
        assert!(ImageAttachment::new("photo.JPG".to_string(), vec![1, 2, 3]).is_ok());
    }
}
