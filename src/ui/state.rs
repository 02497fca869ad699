use std::collections::HashSet;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::common::{
    ChatMessage, ConnectionStatus, ImageAttachment, NetworkEvent, PresenceRecord, SelectedPeer,
};

const NOTICE_LIFETIME: Duration = Duration::from_secs(4);

/// An optimistic "Sending..." bubble awaiting server confirmation.
#[derive(Debug, Clone)]
pub struct PendingBubble {
    pub local_id: Uuid,
    pub content: String,
    pub image_name: Option<String>,
}

/// Conversation history load state for the selected peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryView {
    Idle,
    Loading,
    Failed(String),
    Loaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Error,
    Info,
}

/// A transient, dismissible notification.
#[derive(Debug, Clone)]
pub struct Notice {
    pub id: u64,
    pub text: String,
    pub kind: NoticeKind,
    pub created: Instant,
}

/// Local UI state, mutated only on the UI thread by applying network events
/// and user input.
pub struct AppState {
    pub self_username: String,
    pub server_url: String,
    pub connection: ConnectionStatus,
    pub users: Vec<PresenceRecord>,
    pub selected: Option<SelectedPeer>,
    pub history: HistoryView,
    pub messages: Vec<ChatMessage>,
    pub pending: Vec<PendingBubble>,
    pub input_text: String,
    pub search_text: String,
    pub attachment: Option<ImageAttachment>,
    pub notices: Vec<Notice>,
    next_notice_id: u64,
}

impl AppState {
    pub fn new(self_username: String, server_url: String) -> Self {
        Self {
            self_username,
            server_url: server_url.trim_end_matches('/').to_string(),
            connection: ConnectionStatus::Connecting,
            users: Vec::new(),
            selected: None,
            history: HistoryView::Idle,
            messages: Vec::new(),
            pending: Vec::new(),
            input_text: String::new(),
            search_text: String::new(),
            attachment: None,
            notices: Vec::new(),
            next_notice_id: 0,
        }
    }

    pub fn apply_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::Connection(status) => {
                if status == ConnectionStatus::Failed {
                    self.push_notice(
                        "Connection to chat server lost. Please restart the client.",
                        NoticeKind::Error,
                    );
                }
                self.connection = status;
            }
            NetworkEvent::MessageReceived(message) => self.messages.push(message),
            NetworkEvent::MessagePending {
                local_id,
                content,
                image_name,
            } => self.pending.push(PendingBubble {
                local_id,
                content,
                image_name,
            }),
            NetworkEvent::PendingResolved(local_id) => {
                self.pending.retain(|bubble| bubble.local_id != local_id);
            }
            NetworkEvent::SendFailed { local_id, reason } => {
                self.pending.retain(|bubble| bubble.local_id != local_id);
                self.push_notice(&reason, NoticeKind::Error);
            }
            NetworkEvent::HistoryLoaded { peer_id, messages } => {
                if self.selected.as_ref().is_some_and(|peer| peer.id == peer_id) {
                    self.messages = messages;
                    self.history = HistoryView::Loaded;
                }
            }
            NetworkEvent::HistoryFailed { peer_id, reason } => {
                if self.selected.as_ref().is_some_and(|peer| peer.id == peer_id) {
                    self.history = HistoryView::Failed(reason);
                }
            }
            NetworkEvent::PresenceReplaced(users) => self.replace_users(users),
            NetworkEvent::PresenceChanged { username, online } => {
                if let Some(user) = self.users.iter_mut().find(|user| user.username == username) {
                    user.is_online = online;
                }
                sort_users(&mut self.users);
            }
            NetworkEvent::ServerError(error) => {
                self.push_notice(&format!("Error: {error}"), NoticeKind::Error);
            }
        }
    }

    /// Open the conversation with a peer; history arrives asynchronously.
    pub fn select_peer(&mut self, id: i64, username: String) {
        self.selected = Some(SelectedPeer { id, username });
        self.messages.clear();
        self.history = HistoryView::Loading;
    }

    /// Presence entry for the selected peer, if it is still in the list.
    pub fn selected_presence(&self) -> Option<&PresenceRecord> {
        let selected = self.selected.as_ref()?;
        self.users.iter().find(|user| user.id == selected.id)
    }

    /// Users matching the sidebar search box, case-insensitively.
    pub fn visible_users(&self) -> impl Iterator<Item = &PresenceRecord> {
        let needle = self.search_text.to_lowercase();
        self.users
            .iter()
            .filter(move |user| needle.is_empty() || user.username.to_lowercase().contains(&needle))
    }

    fn replace_users(&mut self, users: Vec<PresenceRecord>) {
        let mut seen = HashSet::new();
        self.users = users
            .into_iter()
            .filter(|user| seen.insert(user.username.clone()))
            .collect();
        sort_users(&mut self.users);
    }

    pub fn attach_image(&mut self, file_name: String, bytes: Vec<u8>) {
        match ImageAttachment::new(file_name, bytes) {
            Ok(attachment) => {
                self.push_notice(
                    &format!("Image attached: {}", attachment.file_name),
                    NoticeKind::Info,
                );
                self.attachment = Some(attachment);
            }
            Err(reason) => self.push_notice(&reason, NoticeKind::Error),
        }
    }

    pub fn push_notice(&mut self, text: &str, kind: NoticeKind) {
        self.next_notice_id += 1;
        self.notices.push(Notice {
            id: self.next_notice_id,
            text: text.to_string(),
            kind,
            created: Instant::now(),
        });
    }

    pub fn dismiss_notice(&mut self, id: u64) {
        self.notices.retain(|notice| notice.id != id);
    }

    /// Drop notices older than their display lifetime.
    pub fn prune_notices(&mut self) {
        self.notices
            .retain(|notice| notice.created.elapsed() < NOTICE_LIFETIME);
    }
}

/// Online users first, then case-insensitive username order.
fn sort_users(users: &mut [PresenceRecord]) {
    users.sort_by(|a, b| {
        b.is_online
            .cmp(&a.is_online)
            .then_with(|| a.username.to_lowercase().cmp(&b.username.to_lowercase()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, username: &str, online: bool) -> PresenceRecord {
        PresenceRecord {
            id,
            username: username.to_string(),
            is_online: online,
            profile_picture: None,
        }
    }

    fn state() -> AppState {
        AppState::new("me".to_string(), "http://127.0.0.1:8000".to_string())
    }

    #[test]
    fn presence_replacement_sorts_online_first_and_deduplicates() {
        let mut state = state();
        state.apply_event(NetworkEvent::PresenceReplaced(vec![
            user(1, "zoe", false),
            user(2, "Bob", true),
            user(3, "alice", true),
            user(4, "Bob", false),
        ]));
        let names: Vec<&str> = state.users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "Bob", "zoe"]);
    }

    #[test]
    fn presence_patch_updates_a_single_user() {
        let mut state = state();
        state.apply_event(NetworkEvent::PresenceReplaced(vec![
            user(1, "alice", true),
            user(2, "bob", false),
        ]));
        state.apply_event(NetworkEvent::PresenceChanged {
            username: "bob".to_string(),
            online: true,
        });
        assert!(state.users.iter().find(|u| u.username == "bob").unwrap().is_online);
    }

    #[test]
    fn history_only_applies_to_the_selected_conversation() {
        let mut state = state();
        state.select_peer(7, "alice".to_string());
        state.apply_event(NetworkEvent::HistoryLoaded {
            peer_id: 9,
            messages: vec![],
        });
        assert_eq!(state.history, HistoryView::Loading);

        state.apply_event(NetworkEvent::HistoryLoaded {
            peer_id: 7,
            messages: vec![],
        });
        assert_eq!(state.history, HistoryView::Loaded);
    }

    #[test]
    fn send_failure_removes_the_placeholder_and_raises_a_notice() {
        let mut state = state();
        let local_id = Uuid::new_v4();
        state.apply_event(NetworkEvent::MessagePending {
            local_id,
            content: "hi".to_string(),
            image_name: None,
        });
        assert_eq!(state.pending.len(), 1);
        state.apply_event(NetworkEvent::SendFailed {
            local_id,
            reason: "disconnected".to_string(),
        });
        assert!(state.pending.is_empty());
        assert_eq!(state.notices.len(), 1);
    }

    #[test]
    fn notices_expire_after_their_lifetime() {
        let mut state = state();
        state.push_notice("stale", NoticeKind::Info);
        state.notices[0].created = Instant::now() - Duration::from_secs(5);
        state.push_notice("fresh", NoticeKind::Info);
        state.prune_notices();
        assert_eq!(state.notices.len(), 1);
        assert_eq!(state.notices[0].text, "fresh");
    }

    #[test]
    fn sidebar_search_filters_users() {
        let mut state = state();
        state.apply_event(NetworkEvent::PresenceReplaced(vec![
            user(1, "alice", true),
            user(2, "bob", true),
        ]));
        state.search_text = "AL".to_string();
        let visible: Vec<&str> = state.visible_users().map(|u| u.username.as_str()).collect();
        assert_eq!(visible, vec!["alice"]);
    }

    #[test]
    fn oversized_attachment_is_rejected_with_a_notice() {
        let mut state = state();
        state.attach_image("big.png".to_string(), vec![0; crate::common::types::MAX_IMAGE_BYTES + 1]);
        assert!(state.attachment.is_none());
        assert_eq!(state.notices.len(), 1);
    }
}
