use std::error::Error;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

use crate::api::{ApiClient, ApiError};
use crate::common::{ChatMessage, ConnectionStatus, NetworkCommand, NetworkEvent};
use crate::config::{AppConfig, ImageTransport};

use super::session::{PreparedSend, Retry, RetryPolicy, Session};
use super::wire::OutboundFrame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Why the inner connection loop returned.
enum LoopExit {
    /// The UI dropped the command channel; tear down for good.
    Shutdown,
    ConnectionLost(String),
}

/// Result of a spawned background task that must update session state.
enum TaskResult {
    UploadFinished {
        local_id: Uuid,
        result: Result<ChatMessage, ApiError>,
    },
}

/// Network actor. Owns the WebSocket stream, the keepalive timer, and the
/// [`Session`] state machine; talks to the UI exclusively through channels.
pub struct ChatClient {
    config: AppConfig,
    event_sender: mpsc::Sender<NetworkEvent>,
    command_receiver: mpsc::Receiver<NetworkCommand>,
}

impl ChatClient {
    pub fn new(
        config: AppConfig,
        event_sender: mpsc::Sender<NetworkEvent>,
        command_receiver: mpsc::Receiver<NetworkCommand>,
    ) -> Self {
        Self {
            config,
            event_sender,
            command_receiver,
        }
    }

    pub async fn run(self) -> Result<(), Box<dyn Error>> {
        let ChatClient {
            config,
            event_sender,
            command_receiver,
        } = self;

        let api = ApiClient::new(config.server_url.clone(), config.session_cookie.clone());
        let session = Session::new(
            config.username.clone(),
            RetryPolicy {
                base_delay: Duration::from_millis(config.reconnect_base_ms),
                max_delay: Duration::from_millis(config.reconnect_max_ms),
                max_attempts: config.max_reconnect_attempts,
            },
        );
        // Internal channel for spawned tasks whose results touch the session.
        let (task_sender, task_receiver) = mpsc::channel(32);

        let mut core = ClientCore {
            config,
            api,
            session,
            event_sender,
            task_sender,
        };
        core.run_loop(command_receiver, task_receiver).await
    }
}

/// Everything the connection loops mutate, kept apart from the receivers so
/// both can be borrowed inside one `select!`.
struct ClientCore {
    config: AppConfig,
    api: ApiClient,
    session: Session,
    event_sender: mpsc::Sender<NetworkEvent>,
    task_sender: mpsc::Sender<TaskResult>,
}

impl ClientCore {
    async fn run_loop(
        &mut self,
        mut commands: mpsc::Receiver<NetworkCommand>,
        mut tasks: mpsc::Receiver<TaskResult>,
    ) -> Result<(), Box<dyn Error>> {
        let ws_url = self.config.ws_url();
        log::info!("Realtime endpoint: {ws_url}");

        loop {
            let generation = self.session.on_connecting();
            self.emit(NetworkEvent::Connection(ConnectionStatus::Connecting))
                .await;

            match self.connect(&ws_url).await {
                Ok(stream) => {
                    self.session.on_open();
                    log::info!("WebSocket connection established (generation {generation})");
                    self.emit(NetworkEvent::Connection(ConnectionStatus::Connected))
                        .await;
                    // The original client refreshes the user list in onopen.
                    self.spawn_users_refresh();

                    match self.drive(stream, &mut commands, &mut tasks).await {
                        LoopExit::Shutdown => {
                            log::info!("UI closed; network client shutting down");
                            return Ok(());
                        }
                        LoopExit::ConnectionLost(reason) => {
                            log::warn!("Connection lost (generation {generation}): {reason}");
                            let events = self.session.fail_in_flight(
                                "Connection lost before the server confirmed this message.",
                            );
                            self.emit_all(events).await;
                        }
                    }
                }
                Err(err) => {
                    log::warn!("WebSocket connect failed (generation {generation}): {err}");
                }
            }

            match self.session.on_close() {
                Retry::After(delay) => {
                    let attempt = self.session.attempts();
                    log::info!("Reconnecting in {}ms (attempt {attempt})", delay.as_millis());
                    self.emit(NetworkEvent::Connection(ConnectionStatus::Reconnecting {
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                    }))
                    .await;
                    if !self.wait_for_retry(delay, &mut commands, &mut tasks).await {
                        log::info!("UI closed during backoff; network client shutting down");
                        return Ok(());
                    }
                }
                Retry::GiveUp => {
                    log::error!(
                        "Giving up after {} reconnect attempts",
                        self.config.max_reconnect_attempts
                    );
                    self.emit(NetworkEvent::Connection(ConnectionStatus::Failed))
                        .await;
                    return Ok(());
                }
            }
        }
    }

    async fn connect(&self, ws_url: &str) -> Result<WsStream, String> {
        let mut request = ws_url
            .into_client_request()
            .map_err(|err| err.to_string())?;
        if let Some(cookie) = &self.config.session_cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|err| format!("invalid session cookie: {err}"))?;
            request.headers_mut().insert(COOKIE, value);
        }
        let (stream, _) = connect_async(request).await.map_err(|err| err.to_string())?;
        Ok(stream)
    }

    /// Inner loop for one live connection. Interleaves UI commands, spawned
    /// task results, inbound frames, and the keepalive tick; inbound frames
    /// are handled strictly in arrival order.
    async fn drive(
        &mut self,
        stream: WsStream,
        commands: &mut mpsc::Receiver<NetworkCommand>,
        tasks: &mut mpsc::Receiver<TaskResult>,
    ) -> LoopExit {
        let (mut ws_tx, mut ws_rx): (WsSink, WsSource) = stream.split();
        let keepalive = Duration::from_secs(self.config.keepalive_secs);
        let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + keepalive, keepalive);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        None => {
                            let _ = ws_tx.send(Message::Close(None)).await;
                            return LoopExit::Shutdown;
                        }
                        Some(command) => {
                            if let Err(reason) = self.handle_command(command, &mut ws_tx).await {
                                return LoopExit::ConnectionLost(reason);
                            }
                        }
                    }
                }
                Some(task) = tasks.recv() => {
                    self.handle_task(task).await;
                }
                frame = ws_rx.next() => {
                    match frame {
                        Some(Ok(Message::Text(raw))) => {
                            let events = self.session.on_frame(&raw);
                            self.emit_all(events).await;
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = ws_tx.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            return LoopExit::ConnectionLost("closed by server".to_string());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            return LoopExit::ConnectionLost(err.to_string());
                        }
                        None => {
                            return LoopExit::ConnectionLost("stream ended".to_string());
                        }
                    }
                }
                _ = ping.tick() => {
                    match OutboundFrame::Ping.to_json() {
                        Ok(json) => {
                            if let Err(err) = ws_tx.send(Message::Text(json)).await {
                                return LoopExit::ConnectionLost(format!("ping failed: {err}"));
                            }
                        }
                        Err(err) => {
                            log::warn!("Failed to serialize ping frame: {err}");
                        }
                    }
                }
            }
        }
    }

    async fn handle_command(
        &mut self,
        command: NetworkCommand,
        ws_tx: &mut WsSink,
    ) -> Result<(), String> {
        match command {
            NetworkCommand::SendMessage { content, image } => {
                let (events, prepared) = self.session.begin_send(&content, image);
                self.emit_all(events).await;

                let Some(prepared) = prepared else {
                    return Ok(());
                };

                if prepared.image.is_some() && self.config.image_transport == ImageTransport::Upload
                {
                    self.spawn_upload(prepared);
                    return Ok(());
                }

                let frame = OutboundFrame::chat_message(
                    prepared.receiver_id,
                    prepared.content.clone(),
                    prepared.image.as_ref(),
                );
                match frame.to_json() {
                    Ok(json) => {
                        if let Err(err) = ws_tx.send(Message::Text(json)).await {
                            let events = self
                                .session
                                .abort_send(prepared.local_id, "Connection lost while sending.");
                            self.emit_all(events).await;
                            return Err(format!("send failed: {err}"));
                        }
                    }
                    Err(err) => {
                        log::warn!("Failed to serialize message: {err}");
                        let events = self
                            .session
                            .abort_send(prepared.local_id, "Failed to encode message.");
                        self.emit_all(events).await;
                    }
                }
            }
            NetworkCommand::SelectPeer { id, username } => {
                self.session.select_peer(id, username);
                self.spawn_history_fetch(id);
            }
            NetworkCommand::RefreshUsers => self.spawn_users_refresh(),
            NetworkCommand::EnsureConnected => {
                log::debug!("EnsureConnected while {:?}; nothing to do", self.session.phase());
            }
        }
        Ok(())
    }

    /// Handle a command while no connection is open. Sends still go through
    /// the session so the disconnected-send contract (placeholder withdrawn,
    /// notice surfaced) applies; fetches work over plain HTTP regardless.
    async fn handle_offline_command(&mut self, command: NetworkCommand) {
        match command {
            NetworkCommand::SendMessage { content, image } => {
                let (events, prepared) = self.session.begin_send(&content, image);
                debug_assert!(prepared.is_none());
                self.emit_all(events).await;
            }
            NetworkCommand::SelectPeer { id, username } => {
                self.session.select_peer(id, username);
                self.spawn_history_fetch(id);
            }
            NetworkCommand::RefreshUsers => self.spawn_users_refresh(),
            NetworkCommand::EnsureConnected => {}
        }
    }

    /// Sleep out the backoff delay while staying responsive to commands.
    /// Returns `false` when the UI went away and the actor should exit. An
    /// `EnsureConnected` command (window regained focus) cuts the wait short
    /// and retries immediately.
    async fn wait_for_retry(
        &mut self,
        delay: Duration,
        commands: &mut mpsc::Receiver<NetworkCommand>,
        tasks: &mut mpsc::Receiver<TaskResult>,
    ) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = commands.recv() => {
                    match command {
                        None => return false,
                        Some(NetworkCommand::EnsureConnected) => {
                            log::info!("Reconnect requested; skipping remaining backoff");
                            return true;
                        }
                        Some(command) => self.handle_offline_command(command).await,
                    }
                }
                Some(task) = tasks.recv() => {
                    self.handle_task(task).await;
                }
            }
        }
    }

    async fn handle_task(&mut self, task: TaskResult) {
        match task {
            TaskResult::UploadFinished { local_id, result } => {
                let events = match result {
                    Ok(message) => self.session.resolve_upload(local_id, message),
                    Err(err) => {
                        log::warn!("Image upload failed: {err}");
                        self.session
                            .abort_send(local_id, &format!("Image upload failed: {err}"))
                    }
                };
                self.emit_all(events).await;
            }
        }
    }

    fn spawn_upload(&self, prepared: PreparedSend) {
        let Some(image) = prepared.image else {
            return;
        };
        let api = self.api.clone();
        let task_sender = self.task_sender.clone();
        let local_id = prepared.local_id;
        let receiver_id = prepared.receiver_id;
        let content = prepared.content;
        tokio::spawn(async move {
            let result = api.upload_message(receiver_id, content, image).await;
            let _ = task_sender
                .send(TaskResult::UploadFinished { local_id, result })
                .await;
        });
    }

    fn spawn_history_fetch(&self, peer_id: i64) {
        let api = self.api.clone();
        let event_sender = self.event_sender.clone();
        tokio::spawn(async move {
            let event = match api.fetch_history(peer_id).await {
                Ok(messages) => NetworkEvent::HistoryLoaded { peer_id, messages },
                Err(err) => {
                    log::warn!("History fetch for peer {peer_id} failed: {err}");
                    NetworkEvent::HistoryFailed {
                        peer_id,
                        reason: err.to_string(),
                    }
                }
            };
            let _ = event_sender.send(event).await;
        });
    }

    fn spawn_users_refresh(&self) {
        let api = self.api.clone();
        let event_sender = self.event_sender.clone();
        tokio::spawn(async move {
            let event = match api.fetch_users().await {
                Ok(users) => NetworkEvent::PresenceReplaced(users),
                Err(err) => {
                    log::warn!("User list fetch failed: {err}");
                    NetworkEvent::ServerError(format!("Error loading users: {err}"))
                }
            };
            let _ = event_sender.send(event).await;
        });
    }

    async fn emit(&self, event: NetworkEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::warn!("Failed to notify UI: {err}");
        }
    }

    async fn emit_all(&self, events: Vec<NetworkEvent>) {
        for event in events {
            self.emit(event).await;
        }
    }
}
