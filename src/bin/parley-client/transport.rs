use tokio::sync::mpsc;
use tracing::debug;

use parley::transport::{Outbound, Transport};
use parley::{Error, Result};

/// Session-side half of the WebSocket: frames are handed to the async writer task.
///
/// Closing drops the sender, which makes the writer send a close frame and exit.
pub struct WsTransport {
    tx: Option<mpsc::UnboundedSender<Outbound>>,
}

impl WsTransport {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx: Some(tx) }
    }
}

impl Transport for WsTransport {
    fn send(&mut self, frame: Outbound) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::Transport("channel already closed".to_owned()))?;
        tx.send(frame)
            .map_err(|_| Error::Transport("websocket writer has stopped".to_owned()))
    }

    fn close(&mut self) {
        if self.tx.take().is_some() {
            debug!("closing websocket");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_after_close_is_a_transport_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = WsTransport::new(tx);

        transport
            .send(Outbound::Text("hi".into()))
            .expect("send while open");
        assert_eq!(rx.try_recv().ok(), Some(Outbound::Text("hi".into())));

        transport.close();
        transport.close();
        let err = transport.send(Outbound::Text("late".into())).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(rx.try_recv().is_err());
    }
}
