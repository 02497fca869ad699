mod api;
mod common;
mod config;
mod network;
mod ui;

use clap::Parser;
use config::AppConfig;
use dotenvy::dotenv;
use network::ChatClient;
use tokio::sync::mpsc;
use ui::ChatApp;

#[derive(Parser)]
#[command(
    name = "rust_chat_client",
    version,
    about = "Desktop client for the realtime chat server"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Chat server base URL (overrides config and CHAT_SERVER_URL)
    #[arg(long, value_name = "URL")]
    server_url: Option<String>,
    /// Username to identify own messages (overrides config and CHAT_USERNAME)
    #[arg(long)]
    username: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), eframe::Error> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let mut app_config = config::load_config(&cli.config);
    if !std::path::Path::new(&cli.config).exists() {
        // Leave a template behind so server_url/username are easy to fill in.
        if let Err(err) = config::save_config(&cli.config, &app_config) {
            log::warn!("Failed to write default config {}: {err}", cli.config);
        }
    }
    apply_overrides(&mut app_config, &cli);

    if app_config.username.is_empty() {
        log::warn!("No username configured; own messages cannot be told apart from the peer's");
    }

    // UI -> Network
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // Network -> UI
    let (event_tx, event_rx) = mpsc::channel(100);

    let client_config = app_config.clone();
    tokio::spawn(async move {
        let client = ChatClient::new(client_config, event_tx, cmd_rx);
        if let Err(err) = client.run().await {
            log::error!("Network client terminated: {err}");
        }
    });

    let options = eframe::NativeOptions::default();
    let mut event_rx = Some(event_rx);

    eframe::run_native(
        "Rust Chat Client",
        options,
        Box::new(move |cc| {
            let event_receiver = event_rx
                .take()
                .expect("ChatApp should only be initialized once");

            log::info!("Client started against {}", app_config.server_url);

            Ok(Box::new(ChatApp::new(
                cc,
                &app_config,
                cmd_tx.clone(),
                event_receiver,
            )))
        }),
    )
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Ok(url) = std::env::var("CHAT_SERVER_URL") {
        config.server_url = url;
    }
    if let Ok(username) = std::env::var("CHAT_USERNAME") {
        config.username = username;
    }
    if let Ok(cookie) = std::env::var("CHAT_SESSION_COOKIE") {
        if !cookie.is_empty() {
            config.session_cookie = Some(cookie);
        }
    }
    if let Some(url) = &cli.server_url {
        config.server_url = url.clone();
    }
    if let Some(username) = &cli.username {
        config.username = username.clone();
    }
}
