use uuid::Uuid;

use super::types::{ChatMessage, ConnectionStatus, PresenceRecord};

/// Events from the network layer up to the UI.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    Connection(ConnectionStatus),
    /// A confirmed message for the active conversation.
    MessageReceived(ChatMessage),
    /// An optimistic send was accepted; render a placeholder bubble.
    MessagePending {
        local_id: Uuid,
        content: String,
        image_name: Option<String>,
    },
    /// The server confirmed an optimistic send; remove its placeholder.
    PendingResolved(Uuid),
    /// An optimistic send failed; remove its placeholder and notify.
    SendFailed { local_id: Uuid, reason: String },
    HistoryLoaded {
        peer_id: i64,
        messages: Vec<ChatMessage>,
    },
    HistoryFailed { peer_id: i64, reason: String },
    /// Full replacement of the presence view.
    PresenceReplaced(Vec<PresenceRecord>),
    /// Single-user presence patch.
    PresenceChanged { username: String, online: bool },
    /// Server-reported error or failed fetch; shown as a dismissible notice.
    ServerError(String),
}
