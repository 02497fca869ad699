use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config/client.json";

/// How image attachments travel to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageTransport {
    /// Base64 field on the realtime chat frame.
    Websocket,
    /// Multipart POST to the upload endpoint.
    Upload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP base URL of the chat server; the realtime URL is derived from it.
    pub server_url: String,
    /// Username we are logged in as; used to tell own messages apart.
    pub username: String,
    /// Session cookie passed on HTTP requests and the WebSocket handshake.
    pub session_cookie: Option<String>,
    pub keepalive_secs: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    pub max_reconnect_attempts: u32,
    pub image_transport: ImageTransport,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".to_string(),
            username: String::new(),
            session_cookie: None,
            keepalive_secs: 30,
            reconnect_base_ms: 1000,
            reconnect_max_ms: 30_000,
            max_reconnect_attempts: 5,
            image_transport: ImageTransport::Websocket,
        }
    }
}

impl AppConfig {
    /// Realtime endpoint derived from the HTTP base URL, `http` mapping to
    /// `ws` and `https` to `wss`.
    pub fn ws_url(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        let realtime_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{base}")
        };
        format!("{realtime_base}/ws/chat/")
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

pub fn save_config(path: &str, config: &AppConfig) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reconnect_contract() {
        let config = AppConfig::default();
        assert_eq!(config.reconnect_base_ms, 1000);
        assert_eq!(config.reconnect_max_ms, 30_000);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.keepalive_secs, 30);
    }

    #[test]
    fn ws_url_follows_the_http_scheme() {
        let mut config = AppConfig::default();
        config.server_url = "http://chat.example.com".to_string();
        assert_eq!(config.ws_url(), "ws://chat.example.com/ws/chat/");

        config.server_url = "https://chat.example.com/".to_string();
        assert_eq!(config.ws_url(), "wss://chat.example.com/ws/chat/");

        config.server_url = "chat.example.com".to_string();
        assert_eq!(config.ws_url(), "ws://chat.example.com/ws/chat/");
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = load_config("config/definitely-not-there.json");
        assert_eq!(config.server_url, AppConfig::default().server_url);
    }

    #[test]
    fn partial_config_files_keep_defaults_for_missing_fields() {
        let config: AppConfig =
            serde_json::from_str(r#"{"server_url":"https://chat.internal","username":"me"}"#)
                .unwrap();
        assert_eq!(config.server_url, "https://chat.internal");
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.image_transport, ImageTransport::Websocket);
    }
}
