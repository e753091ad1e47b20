use std::sync::mpsc;

use crate::playback::Ticket;

/// Everything that can happen to a session.
///
/// Device callbacks, clip watchers and the transport reader never touch session state;
/// they only send one of these into the session's queue.
#[derive(Clone, PartialEq)]
pub enum SessionEvent {
    /// The duplex channel is open and ready for the auth handshake.
    TransportOpened,
    /// Mono samples at the segmenter rate.
    Samples(Vec<f32>),
    CaptureLost(String),
    /// Inbound text frame.
    Text(String),
    /// Inbound binary frame.
    Binary(Vec<u8>),
    ClipEnded(Ticket),
    ClipFailed(Ticket, String),
    /// The peer closed the channel.
    TransportClosed,
    TransportFailed(String),
    /// The user ended the call.
    HangUp,
}

impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransportOpened => f.write_str("TransportOpened"),
            Self::Samples(s) => write!(f, "Samples({} samples)", s.len()),
            Self::CaptureLost(r) => f.debug_tuple("CaptureLost").field(r).finish(),
            Self::Text(t) => f.debug_tuple("Text").field(t).finish(),
            Self::Binary(b) => write!(f, "Binary({} bytes)", b.len()),
            Self::ClipEnded(t) => f.debug_tuple("ClipEnded").field(t).finish(),
            Self::ClipFailed(t, r) => f.debug_tuple("ClipFailed").field(t).field(r).finish(),
            Self::TransportClosed => f.write_str("TransportClosed"),
            Self::TransportFailed(r) => f.debug_tuple("TransportFailed").field(r).finish(),
            Self::HangUp => f.write_str("HangUp"),
        }
    }
}

pub type EventReceiver = mpsc::Receiver<SessionEvent>;

/// Cloneable handle for feeding events into a session from any thread.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<SessionEvent>,
}

impl EventSender {
    /// Returns `false` once the session has gone away; callers should stop producing.
    pub fn send(&self, event: SessionEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Create the session's event queue.
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel();
    (EventSender { tx }, rx)
}
