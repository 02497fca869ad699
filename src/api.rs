use chrono::Utc;
use reqwest::header::COOKIE;
use reqwest::multipart;
use serde::Deserialize;
use thiserror::Error;

use crate::common::{ChatMessage, ImageAttachment, PresenceRecord};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

/// Thin client for the chat server's HTTP API: message history, the user
/// list, and the non-realtime image upload path.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session_cookie: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: String, session_cookie: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_cookie,
        }
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn with_cookie(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.session_cookie {
            Some(cookie) => request.header(COOKIE, cookie.as_str()),
            None => request,
        }
    }

    /// GET `/api/messages/?receiver=<id>`: ordered conversation history.
    pub async fn fetch_history(&self, receiver_id: i64) -> Result<Vec<ChatMessage>, ApiError> {
        let url = format!("{}?receiver={receiver_id}", self.endpoint("/api/messages/"));
        let response = self.with_cookie(self.http.get(url)).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }
        let rows: Vec<MessageRow> = response.json().await?;
        Ok(rows.into_iter().map(MessageRow::into_chat_message).collect())
    }

    /// GET `/api/users/`: the full presence list.
    pub async fn fetch_users(&self) -> Result<Vec<PresenceRecord>, ApiError> {
        #[derive(Deserialize)]
        struct UsersResponse {
            users: Vec<PresenceRecord>,
        }

        let response = self
            .with_cookie(self.http.get(self.endpoint("/api/users/")))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }
        let body: UsersResponse = response.json().await?;
        Ok(body.users)
    }

    /// Multipart POST `/api/upload/`: the non-realtime send path for image
    /// attachments. Returns the confirmed message with its resolved image URL.
    pub async fn upload_message(
        &self,
        receiver_id: i64,
        content: String,
        image: ImageAttachment,
    ) -> Result<ChatMessage, ApiError> {
        let part = multipart::Part::bytes(image.bytes.to_vec()).file_name(image.file_name.clone());
        let form = multipart::Form::new()
            .text("receiver_id", receiver_id.to_string())
            .text("message", content)
            .part("image", part);

        let response = self
            .with_cookie(self.http.post(self.endpoint("/api/upload/")))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }
        let row: MessageRow = response.json().await?;
        Ok(row.into_chat_message())
    }
}

/// Message shape shared by the history endpoint and the upload response.
/// History rows carry the text under `content`; the upload response mirrors
/// the realtime frame and may use `message`.
#[derive(Debug, Deserialize)]
struct MessageRow {
    sender: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    sender_profile_picture: Option<String>,
}

impl MessageRow {
    fn into_chat_message(self) -> ChatMessage {
        let content = self.message.or(self.content).unwrap_or_default();
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_without_double_slashes() {
        let api = ApiClient::new("http://127.0.0.1:8000/".to_string(), None);
        assert_eq!(
            api.endpoint("/api/messages/"),
            "http://127.0.0.1:8000/api/messages/"
        );
        assert_eq!(api.endpoint("/api/users/"), "http://127.0.0.1:8000/api/users/");
    }

    #[test]
    fn history_rows_convert_to_chat_messages() {
        let row: MessageRow = serde_json::from_str(
            r#"{"sender":"alice","content":"hi","timestamp":"2026-03-01T10:15:30.000000","sender_profile_picture":null}"#,
        )
        .unwrap();
        let message = row.into_chat_message();
        assert_eq!(message.sender, "alice");
        assert_eq!(message.content, "hi");
        assert!(message.image_url.is_none());
    }
}
