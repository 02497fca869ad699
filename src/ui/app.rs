use eframe::egui;
use tokio::sync::mpsc;

use crate::common::{ConnectionStatus, NetworkCommand, NetworkEvent};
use crate::config::AppConfig;

use super::components::{chat_area, input_bar, sidebar};
use super::state::{AppState, NoticeKind};

pub struct ChatApp {
    state: AppState,
    command_sender: mpsc::Sender<NetworkCommand>,
    event_receiver: mpsc::Receiver<NetworkEvent>,
    was_focused: bool,
}

impl ChatApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        config: &AppConfig,
        command_sender: mpsc::Sender<NetworkCommand>,
        event_receiver: mpsc::Receiver<NetworkEvent>,
    ) -> Self {
        Self {
            state: AppState::new(config.username.clone(), config.server_url.clone()),
            command_sender,
            event_receiver,
            was_focused: true,
        }
    }

    fn handle_network_events(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            self.state.apply_event(event);
        }
    }

    fn send_command(&mut self, command: NetworkCommand) {
        if let Err(err) = self.command_sender.try_send(command) {
            log::warn!("Failed to send command to network: {err}");
        }
    }

    /// Desktop analogue of the page-visibility handler: when the window
    /// regains focus, ask the network layer to reconnect if it is not open.
    fn check_focus_regained(&mut self, ctx: &egui::Context) {
        let focused = ctx.input(|i| i.raw.focused);
        if focused && !self.was_focused {
            log::info!("Window focused again; checking connection");
            self.send_command(NetworkCommand::EnsureConnected);
        }
        self.was_focused = focused;
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        for file in dropped {
            let (name, bytes) = if let Some(bytes) = file.bytes {
                (file.name.clone(), bytes.to_vec())
            } else if let Some(path) = &file.path {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.name.clone());
                match std::fs::read(path) {
                    Ok(bytes) => (name, bytes),
                    Err(err) => {
                        log::warn!("Failed to read dropped file {}: {err}", path.display());
                        self.state
                            .push_notice("Failed to read the dropped file.", NoticeKind::Error);
                        continue;
                    }
                }
            } else {
                continue;
            };
            self.state.attach_image(name, bytes);
        }
    }

    fn select_peer(&mut self, id: i64, username: String) {
        self.state.select_peer(id, username.clone());
        self.send_command(NetworkCommand::SelectPeer { id, username });
    }

    fn render_status_line(&self, ui: &mut egui::Ui) {
        let (color, text) = match &self.state.connection {
            ConnectionStatus::Connecting => {
                (egui::Color32::YELLOW, "Connecting...".to_string())
            }
            ConnectionStatus::Connected => (egui::Color32::GREEN, "Connected".to_string()),
            ConnectionStatus::Reconnecting { attempt, delay_ms } => (
                egui::Color32::RED,
                format!(
                    "Disconnected - reconnecting in {}s (attempt {attempt})",
                    delay_ms / 1000
                ),
            ),
            ConnectionStatus::Failed => (
                egui::Color32::RED,
                "Connection failed - restart the client to try again".to_string(),
            ),
        };
        ui.horizontal(|ui| {
            ui.colored_label(color, "●");
            ui.label(text);
        });
    }

    fn render_notices(&mut self, ctx: &egui::Context) {
        let mut dismissed = None;
        egui::Area::new(egui::Id::new("notices"))
            .anchor(egui::Align2::RIGHT_TOP, [-12.0, 12.0])
            .show(ctx, |ui| {
                for notice in &self.state.notices {
                    egui::Frame::popup(&ctx.style()).show(ui, |ui| {
                        ui.horizontal(|ui| {
                            let color = match notice.kind {
                                NoticeKind::Error => egui::Color32::RED,
                                NoticeKind::Info => egui::Color32::LIGHT_BLUE,
                            };
                            ui.colored_label(color, &notice.text);
                            if ui.small_button("✖").clicked() {
                                dismissed = Some(notice.id);
                            }
                        });
                    });
                }
            });
        if let Some(id) = dismissed {
            self.state.dismiss_notice(id);
        }
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_network_events();
        self.state.prune_notices();
        self.check_focus_regained(ctx);
        self.handle_dropped_files(ctx);

        egui::TopBottomPanel::top("status_line").show(ctx, |ui| {
            self.render_status_line(ui);
        });

        egui::SidePanel::left("user_sidebar")
            .resizable(true)
            .default_width(200.0)
            .show(ctx, |ui| {
                let actions = sidebar::render(ui, &mut self.state);
                if let Some((id, username)) = actions.selected {
                    self.select_peer(id, username);
                }
                if actions.refresh {
                    self.send_command(NetworkCommand::RefreshUsers);
                }
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            let actions = chat_area::render(ui, &self.state);
            if actions.retry_history {
                if let Some(peer) = self.state.selected.clone() {
                    self.select_peer(peer.id, peer.username);
                }
            }

            ui.separator();
            if let Some(composed) = input_bar::render(ui, &mut self.state) {
                self.send_command(NetworkCommand::SendMessage {
                    content: composed.content,
                    image: composed.image,
                });
            }
        });

        self.render_notices(ctx);

        ctx.request_repaint();
    }
}
