use std::collections::VecDeque;
use std::time::Duration;

use uuid::Uuid;

use crate::common::{ChatMessage, ImageAttachment, NetworkEvent, SelectedPeer};

use super::wire::{InboundEnvelope, WireMessage};

/// Connection lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Open,
    Failed,
}

/// What to do after the connection dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    After(Duration),
    GiveUp,
}

/// Reconnect tuning: capped exponential backoff with a fixed attempt budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
        }
    }
}

/// An optimistically-rendered send the server has not confirmed yet.
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub local_id: Uuid,
    pub content: String,
}

/// A validated send, ready for the transport layer to transmit.
#[derive(Debug, Clone)]
pub struct PreparedSend {
    pub local_id: Uuid,
    pub receiver_id: i64,
    pub content: String,
    pub image: Option<ImageAttachment>,
}

/// Client-side session state: connection phase, retry bookkeeping, the
/// selected conversation, and the queue of unconfirmed optimistic sends.
///
/// This type is deliberately free of I/O. The actor in `client.rs` owns the
/// socket and the timers and calls into the session for every decision, which
/// keeps the state machine testable without a server.
pub struct Session {
    self_username: String,
    retry: RetryPolicy,
    phase: ConnectionPhase,
    attempts: u32,
    generation: u64,
    selected: Option<SelectedPeer>,
    pending: VecDeque<PendingSend>,
}

impl Session {
    pub fn new(self_username: String, retry: RetryPolicy) -> Self {
        Self {
            self_username,
            retry,
            phase: ConnectionPhase::Disconnected,
            attempts: 0,
            generation: 0,
            selected: None,
            pending: VecDeque::new(),
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// A new connection attempt begins. The returned generation number
    /// identifies the attempt in logs; the previous stream (and its keepalive
    /// timer) is owned by the actor and dropped before this is called, so
    /// nothing from an earlier generation can still fire.
    pub fn on_connecting(&mut self) -> u64 {
        self.phase = ConnectionPhase::Connecting;
        self.generation += 1;
        self.generation
    }

    /// Handshake succeeded.
    pub fn on_open(&mut self) {
        self.phase = ConnectionPhase::Open;
        self.attempts = 0;
    }

    /// The connection dropped. Decides between scheduling a retry and giving
    /// up once the attempt budget is exhausted.
    pub fn on_close(&mut self) -> Retry {
        self.attempts += 1;
        if self.attempts > self.retry.max_attempts {
            self.phase = ConnectionPhase::Failed;
            return Retry::GiveUp;
        }
        self.phase = ConnectionPhase::Disconnected;
        Retry::After(self.retry_delay(self.attempts))
    }

    /// `min(base * 2^(attempt-1), cap)` for attempt >= 1.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let base_ms = self.retry.base_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay_ms.min(self.retry.max_delay.as_millis() as u64))
    }

    pub fn select_peer(&mut self, id: i64, username: String) {
        self.selected = Some(SelectedPeer { id, username });
    }

    /// Validate and register an outbound send.
    ///
    /// Empty content with no image, or no selected peer, is a no-op. A valid
    /// send always produces a `MessagePending` event first; when the
    /// connection is not open the placeholder is withdrawn again with a
    /// `SendFailed` event and nothing is transmitted.
    pub fn begin_send(
        &mut self,
        content: &str,
        image: Option<ImageAttachment>,
    ) -> (Vec<NetworkEvent>, Option<PreparedSend>) {
        let content = content.trim();
        if content.is_empty() && image.is_none() {
            return (Vec::new(), None);
        }
        let Some(peer) = self.selected.clone() else {
            return (Vec::new(), None);
        };

        let local_id = Uuid::new_v4();
        let mut events = vec![NetworkEvent::MessagePending {
            local_id,
            content: content.to_string(),
            image_name: image.as_ref().map(|attachment| attachment.file_name.clone()),
        }];

        if self.phase != ConnectionPhase::Open {
            events.push(NetworkEvent::SendFailed {
                local_id,
                reason: "Cannot send message: not connected to the chat server.".to_string(),
            });
            return (events, None);
        }

        self.pending.push_back(PendingSend {
            local_id,
            content: content.to_string(),
        });

        let prepared = PreparedSend {
            local_id,
            receiver_id: peer.id,
            content: content.to_string(),
            image,
        };
        (events, Some(prepared))
    }

    /// Withdraw one specific unconfirmed send (transmit or upload failure).
    pub fn abort_send(&mut self, local_id: Uuid, reason: &str) -> Vec<NetworkEvent> {
        let before = self.pending.len();
        self.pending.retain(|pending| pending.local_id != local_id);
        if self.pending.len() == before {
            return Vec::new();
        }
        vec![NetworkEvent::SendFailed {
            local_id,
            reason: reason.to_string(),
        }]
    }

    /// The upload endpoint confirmed a send directly over HTTP.
    pub fn resolve_upload(&mut self, local_id: Uuid, message: ChatMessage) -> Vec<NetworkEvent> {
        let before = self.pending.len();
        self.pending.retain(|pending| pending.local_id != local_id);
        if self.pending.len() == before {
            log::warn!("Upload confirmation for unknown pending send {local_id}");
            return Vec::new();
        }
        vec![
            NetworkEvent::PendingResolved(local_id),
            NetworkEvent::MessageReceived(message),
        ]
    }

    /// The connection dropped with sends still awaiting confirmation. Those
    /// confirmations will never arrive on the next connection, so the
    /// placeholders are withdrawn rather than left dangling.
    pub fn fail_in_flight(&mut self, reason: &str) -> Vec<NetworkEvent> {
        self.pending
            .drain(..)
            .map(|pending| {
                log::debug!("Dropping unconfirmed send: {}", pending.content);
                NetworkEvent::SendFailed {
                    local_id: pending.local_id,
                    reason: reason.to_string(),
                }
            })
            .collect()
    }

    /// Dispatch one raw inbound text frame. Malformed frames are logged and
    /// discarded without touching session state.
    pub fn on_frame(&mut self, raw: &str) -> Vec<NetworkEvent> {
        let envelope = match serde_json::from_str::<InboundEnvelope>(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("Discarding malformed frame: {err}");
                return Vec::new();
            }
        };

        match envelope {
            InboundEnvelope::Pong => Vec::new(),
            InboundEnvelope::Error { error } => {
                log::warn!("Server reported error: {error}");
                vec![NetworkEvent::ServerError(error)]
            }
            InboundEnvelope::StatusUpdate { users } => {
                vec![NetworkEvent::PresenceReplaced(users)]
            }
            InboundEnvelope::UserStatus { username, status } => {
                vec![NetworkEvent::PresenceChanged {
                    online: status.eq_ignore_ascii_case("online"),
                    username,
                }]
            }
            InboundEnvelope::ChatMessage(message) => self.dispatch_chat_message(message),
            InboundEnvelope::Unknown => {
                log::debug!("Ignoring frame with unrecognized type");
                Vec::new()
            }
        }
    }

    fn dispatch_chat_message(&mut self, message: WireMessage) -> Vec<NetworkEvent> {
        let from_self =
            !self.self_username.is_empty() && message.sender == self.self_username;
        let for_selected = self.selected.as_ref().is_some_and(|peer| {
            message.sender == peer.username
                || message.sender_id == Some(peer.id)
                || message.receiver_id == Some(peer.id)
        });

        if !from_self && !for_selected {
            // Belongs to a conversation that is not open; there is no unread
            // badge mechanism, so the frame is dropped.
            log::debug!("Dropping chat_message outside the active conversation");
            return Vec::new();
        }

        let mut events = Vec::new();
        if from_self {
            // Confirmation of our own optimistic send: resolve the oldest
            // placeholder so multiple in-flight sends settle unambiguously.
            if let Some(pending) = self.pending.pop_front() {
                events.push(NetworkEvent::PendingResolved(pending.local_id));
            }
        }
        events.push(NetworkEvent::MessageReceived(message.into_chat_message()));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open_session() -> Session {
        let mut session = Session::new("me".to_string(), RetryPolicy::default());
        session.on_connecting();
        session.on_open();
        session
    }

    fn confirmation(sender: &str, receiver_id: i64, text: &str) -> String {
        json!({
            "type": "chat_message",
            "sender": sender,
            "receiver_id": receiver_id,
            "message": text,
        })
        .to_string()
    }

    #[test]
    fn backoff_sequence_doubles_up_to_the_cap() {
        let mut session = Session::new("me".to_string(), RetryPolicy::default());
        let mut delays = Vec::new();
        for _ in 0..5 {
            match session.on_close() {
                Retry::After(delay) => delays.push(delay.as_millis() as u64),
                Retry::GiveUp => panic!("gave up inside the attempt budget"),
            }
        }
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
        assert_eq!(session.on_close(), Retry::GiveUp);
        assert_eq!(session.phase(), ConnectionPhase::Failed);
    }

    #[test]
    fn backoff_is_capped() {
        let mut session = Session::new(
            "me".to_string(),
            RetryPolicy {
                max_attempts: 20,
                ..RetryPolicy::default()
            },
        );
        let mut last = Duration::ZERO;
        for _ in 0..10 {
            if let Retry::After(delay) = session.on_close() {
                last = delay;
            }
        }
        assert_eq!(last, Duration::from_millis(30_000));
    }

    #[test]
    fn successful_reconnect_resets_the_attempt_counter() {
        let mut session = Session::new("me".to_string(), RetryPolicy::default());
        session.on_close();
        session.on_close();
        assert_eq!(session.attempts(), 2);
        session.on_connecting();
        session.on_open();
        assert_eq!(session.attempts(), 0);
        assert_eq!(session.phase(), ConnectionPhase::Open);
    }

    #[test]
    fn malformed_frames_leave_state_unchanged() {
        let mut session = open_session();
        session.select_peer(7, "alice".to_string());
        session.begin_send("hold", None);
        let pending_before = session.pending_len();

        for raw in ["not json", "{}", r#"{"type":42}"#, r#"{"sender":"x"}"#] {
            assert!(session.on_frame(raw).is_empty());
        }
        assert_eq!(session.pending_len(), pending_before);
        assert_eq!(session.phase(), ConnectionPhase::Open);
        assert_eq!(session.attempts(), 0);
    }

    #[test]
    fn unknown_frame_type_is_ignored() {
        let mut session = open_session();
        assert!(
            session
                .on_frame(r#"{"type":"typing_indicator","username":"bob"}"#)
                .is_empty()
        );
    }

    #[test]
    fn empty_send_is_a_no_op() {
        let mut session = open_session();
        session.select_peer(7, "alice".to_string());
        let (events, prepared) = session.begin_send("   ", None);
        assert!(events.is_empty());
        assert!(prepared.is_none());
        assert_eq!(session.pending_len(), 0);
    }

    #[test]
    fn send_without_a_selected_peer_is_a_no_op() {
        let mut session = open_session();
        let (events, prepared) = session.begin_send("hi", None);
        assert!(events.is_empty());
        assert!(prepared.is_none());
    }

    #[test]
    fn send_while_disconnected_withdraws_the_placeholder() {
        let mut session = Session::new("me".to_string(), RetryPolicy::default());
        session.select_peer(7, "alice".to_string());
        let (events, prepared) = session.begin_send("hi", None);
        assert!(prepared.is_none());
        assert_eq!(session.pending_len(), 0);
        assert!(matches!(events[0], NetworkEvent::MessagePending { .. }));
        assert!(matches!(events[1], NetworkEvent::SendFailed { .. }));
    }

    #[test]
    fn confirmations_resolve_pending_sends_oldest_first() {
        let mut session = open_session();
        session.select_peer(7, "alice".to_string());

        let (_, first) = session.begin_send("one", None);
        let (_, second) = session.begin_send("two", None);
        let first_id = first.unwrap().local_id;
        let second_id = second.unwrap().local_id;
        assert_eq!(session.pending_len(), 2);

        let events = session.on_frame(&confirmation("me", 7, "one"));
        assert!(matches!(
            events[0],
            NetworkEvent::PendingResolved(id) if id == first_id
        ));
        let events = session.on_frame(&confirmation("me", 7, "two"));
        assert!(matches!(
            events[0],
            NetworkEvent::PendingResolved(id) if id == second_id
        ));
        assert_eq!(session.pending_len(), 0);
    }

    #[test]
    fn foreign_conversation_messages_are_dropped() {
        let mut session = open_session();
        session.select_peer(7, "alice".to_string());
        session.begin_send("hold", None);

        let events = session.on_frame(&json!({
            "type": "chat_message",
            "sender": "mallory",
            "sender_id": 99,
            "receiver_id": 42,
            "message": "psst"
        }).to_string());

        assert!(events.is_empty());
        assert_eq!(session.pending_len(), 1);
    }

    #[test]
    fn select_send_confirm_round_trip() {
        let mut session = open_session();
        session.select_peer(7, "alice".to_string());

        let (events, prepared) = session.begin_send("hi", None);
        assert_eq!(events.len(), 1);
        let prepared = prepared.unwrap();
        assert_eq!(prepared.receiver_id, 7);
        assert_eq!(prepared.content, "hi");

        let events = session.on_frame(&confirmation("me", 7, "hi"));
        assert!(matches!(events[0], NetworkEvent::PendingResolved(_)));
        match &events[1] {
            NetworkEvent::MessageReceived(message) => assert_eq!(message.content, "hi"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(session.pending_len(), 0);
    }

    #[test]
    fn peer_messages_for_the_open_conversation_are_delivered() {
        let mut session = open_session();
        session.select_peer(7, "alice".to_string());

        let events = session.on_frame(&json!({
            "type": "chat_message",
            "sender": "alice",
            "sender_id": 7,
            "message": "hey"
        }).to_string());

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], NetworkEvent::MessageReceived(_)));
    }

    #[test]
    fn presence_frames_map_to_presence_events() {
        let mut session = open_session();

        let events = session.on_frame(
            &json!({"type": "user_status", "username": "bob", "status": "Offline"}).to_string(),
        );
        assert!(matches!(
            &events[0],
            NetworkEvent::PresenceChanged { username, online: false } if username == "bob"
        ));

        let events = session.on_frame(&json!({
            "type": "status_update",
            "users": [{"id": 1, "username": "bob", "is_online": true}]
        }).to_string());
        assert!(matches!(&events[0], NetworkEvent::PresenceReplaced(users) if users.len() == 1));
    }

    #[test]
    fn error_frames_surface_and_pongs_do_not() {
        let mut session = open_session();
        assert!(session.on_frame(r#"{"type":"pong"}"#).is_empty());
        let events = session.on_frame(r#"{"type":"error","error":"receiver missing"}"#);
        assert!(matches!(&events[0], NetworkEvent::ServerError(e) if e == "receiver missing"));
    }

    #[test]
    fn connection_loss_withdraws_in_flight_sends() {
        let mut session = open_session();
        session.select_peer(7, "alice".to_string());
        session.begin_send("one", None);
        session.begin_send("two", None);

        let events = session.fail_in_flight("Connection lost");
        assert_eq!(events.len(), 2);
        assert_eq!(session.pending_len(), 0);
    }

    #[test]
    fn abort_send_removes_exactly_the_failed_send() {
        let mut session = open_session();
        session.select_peer(7, "alice".to_string());
        let (_, first) = session.begin_send("one", None);
        let (_, second) = session.begin_send("two", None);
        let first_id = first.unwrap().local_id;
        let second_id = second.unwrap().local_id;

        let events = session.abort_send(first_id, "Upload failed");
        assert_eq!(events.len(), 1);
        assert_eq!(session.pending_len(), 1);
        // The surviving send is still the newest one.
        let events = session.on_frame(&confirmation("me", 7, "two"));
        assert!(matches!(
            events[0],
            NetworkEvent::PendingResolved(id) if id == second_id
        ));
    }
}
