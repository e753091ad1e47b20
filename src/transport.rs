use crate::Result;

/// A frame on the duplex channel.
#[derive(Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Binary(Vec<u8>),
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Binary(bytes) => write!(f, "Binary({} bytes)", bytes.len()),
        }
    }
}

/// Sending half of the duplex channel as seen by the session.
///
/// The receiving half is not part of this trait: whatever reads the socket turns frames
/// into session events (`Text`, `Binary`, `TransportClosed`, ...) and sends them into the
/// session's queue. Any `send` failure is fatal to the session.
pub trait Transport {
    fn send(&mut self, frame: Outbound) -> Result<()>;

    /// Close the channel. Must be idempotent.
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: Outbound) -> Result<()> {
        (**self).send(frame)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
