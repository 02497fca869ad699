use eframe::egui;

use crate::common::ImageAttachment;
use crate::ui::state::AppState;

/// A composed message the user asked to send.
pub struct ComposedMessage {
    pub content: String,
    pub image: Option<ImageAttachment>,
}

pub fn render(ui: &mut egui::Ui, state: &mut AppState) -> Option<ComposedMessage> {
    let can_send = state.selected.is_some();

    let mut remove_attachment = false;
    if let Some(attachment) = &state.attachment {
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new(format!("📷 {}", attachment.file_name)).weak());
            if ui.small_button("✖").on_hover_text("Remove image").clicked() {
                remove_attachment = true;
            }
        });
    }
    if remove_attachment {
        state.attachment = None;
    }

    let mut send = false;
    ui.horizontal(|ui| {
        let response = ui.add_enabled(
            can_send,
            egui::TextEdit::singleline(&mut state.input_text)
                .hint_text("Type a message... (drop an image to attach)"),
        );
        if ui.add_enabled(can_send, egui::Button::new("Send")).clicked() {
            send = true;
        }
        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            send = true;
        }
    });

    if send && can_send && (!state.input_text.trim().is_empty() || state.attachment.is_some()) {
        let content = state.input_text.trim().to_string();
        state.input_text.clear();
        let image = state.attachment.take();
        return Some(ComposedMessage { content, image });
    }

    None
}
