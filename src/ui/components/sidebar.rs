use eframe::egui;

use crate::ui::state::AppState;

#[derive(Default)]
pub struct SidebarActions {
    pub selected: Option<(i64, String)>,
    pub refresh: bool,
}

pub fn render(ui: &mut egui::Ui, state: &mut AppState) -> SidebarActions {
    let mut actions = SidebarActions::default();

    ui.horizontal(|ui| {
        ui.heading("Users");
        if ui.button("⟳").on_hover_text("Reload user list").clicked() {
            actions.refresh = true;
        }
    });
    ui.text_edit_singleline(&mut state.search_text);
    ui.separator();

    if state.users.is_empty() {
        ui.label("No users yet");
        return actions;
    }

    let selected_id = state.selected.as_ref().map(|peer| peer.id);
    egui::ScrollArea::vertical().show(ui, |ui| {
        for user in state.visible_users() {
            ui.horizontal(|ui| {
                let color = if user.is_online {
                    egui::Color32::GREEN
                } else {
                    egui::Color32::GRAY
                };
                ui.colored_label(color, if user.is_online { "●" } else { "○" });

                let is_selected = selected_id == Some(user.id);
                if ui.selectable_label(is_selected, &user.username).clicked() {
                    actions.selected = Some((user.id, user.username.clone()));
                }
                ui.label(
                    egui::RichText::new(if user.is_online { "Online" } else { "Offline" }).weak(),
                );
            });
        }
    });

    actions
}
