use super::types::ImageAttachment;

/// Commands the UI sends down to the network layer.
#[derive(Debug, Clone)]
pub enum NetworkCommand {
    /// Send a chat message to the selected peer. Empty content with no image
    /// is ignored by the session (unsubmittable form state, not an error).
    SendMessage {
        content: String,
        image: Option<ImageAttachment>,
    },
    /// Open the conversation with a peer and fetch its history.
    SelectPeer { id: i64, username: String },
    /// Re-fetch the user list from the server.
    RefreshUsers,
    /// Reconnect now if the connection is not open. Sent when the window
    /// regains focus; a no-op while connecting or already connected.
    EnsureConnected,
}
