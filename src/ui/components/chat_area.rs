use eframe::egui;

use crate::common::ChatMessage;
use crate::ui::state::{AppState, HistoryView, PendingBubble};

#[derive(Default)]
pub struct ChatAreaActions {
    /// Re-fetch history for the selected peer after a failed load.
    pub retry_history: bool,
}

pub fn render(ui: &mut egui::Ui, state: &AppState) -> ChatAreaActions {
    let mut actions = ChatAreaActions::default();

    let Some(peer) = &state.selected else {
        ui.centered_and_justified(|ui| {
            ui.label("Select a user to start chatting");
        });
        return actions;
    };

    ui.horizontal(|ui| {
        ui.heading(&peer.username);
        let online = state
            .selected_presence()
            .is_some_and(|presence| presence.is_online);
        let (color, text) = if online {
            (egui::Color32::GREEN, "Online")
        } else {
            (egui::Color32::GRAY, "Offline")
        };
        ui.colored_label(color, "●");
        ui.label(egui::RichText::new(text).weak());
    });
    ui.separator();

    match &state.history {
        HistoryView::Loading => {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Loading messages...");
            });
            return actions;
        }
        HistoryView::Failed(reason) => {
            ui.colored_label(egui::Color32::RED, "Error loading messages");
            ui.label(egui::RichText::new(reason).weak());
            if ui.button("Try Again").clicked() {
                actions.retry_history = true;
            }
            return actions;
        }
        HistoryView::Idle | HistoryView::Loaded => {}
    }

    if state.messages.is_empty() && state.pending.is_empty() {
        ui.label("No messages yet. Start a conversation!");
        return actions;
    }

    egui::ScrollArea::vertical()
        .stick_to_bottom(true)
        .show(ui, |ui| {
            for message in &state.messages {
                let mine =
                    !state.self_username.is_empty() && message.sender == state.self_username;
                message_row(ui, state, message, mine);
            }
            for bubble in &state.pending {
                pending_row(ui, bubble);
            }
        });

    actions
}

fn message_row(ui: &mut egui::Ui, state: &AppState, message: &ChatMessage, mine: bool) {
    let layout = if mine {
        egui::Layout::right_to_left(egui::Align::Min)
    } else {
        egui::Layout::left_to_right(egui::Align::Min)
    };
    ui.with_layout(layout, |ui| {
        egui::Frame::group(ui.style()).show(ui, |ui| {
            ui.vertical(|ui| {
                if !mine {
                    ui.horizontal(|ui| {
                        if let Some(picture) = &message.sender_profile_picture {
                            ui.hyperlink_to("👤", absolute_url(&state.server_url, picture))
                                .on_hover_text("Profile picture");
                        }
                        ui.label(egui::RichText::new(&message.sender).strong());
                    });
                }
                if let Some(image_url) = &message.image_url {
                    ui.hyperlink_to("📷 image", absolute_url(&state.server_url, image_url));
                }
                if !message.content.is_empty() {
                    ui.label(&message.content);
                }
                ui.label(
                    egui::RichText::new(message.timestamp.format("%H:%M").to_string()).weak(),
                );
            });
        });
    });
}

fn pending_row(ui: &mut egui::Ui, bubble: &PendingBubble) {
    ui.with_layout(egui::Layout::right_to_left(egui::Align::Min), |ui| {
        egui::Frame::group(ui.style()).show(ui, |ui| {
            ui.vertical(|ui| {
                if let Some(name) = &bubble.image_name {
                    ui.label(egui::RichText::new(format!("📷 {name}")).weak());
                }
                if !bubble.content.is_empty() {
                    ui.label(&bubble.content);
                }
                ui.label(egui::RichText::new("Sending...").weak().italics());
            });
        });
    });
}

/// The server hands out media paths relative to its own origin.
fn absolute_url(server_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("{server_url}{path}")
    }
}
