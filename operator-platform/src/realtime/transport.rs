use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{OperatorError, Result};

/// Outbound half of one observer connection.
pub trait ObserverTransport: Send + Sync {
    fn send_text(&self, text: &str) -> Result<()>;

    /// Close the connection. Later sends fail.
    fn close(&self);
}

/// Hands text frames to the task that owns the socket writer. Sends fail
/// once that task has gone away or the transport was closed.
pub struct ChannelTransport {
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl ObserverTransport for ChannelTransport {
    fn send_text(&self, text: &str) -> Result<()> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(OperatorError::TransportClosed)?;
        tx.send(text.to_string())
            .map_err(|_| OperatorError::Send("observer writer has gone away".to_string()))
    }

    fn close(&self) {
        self.tx.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_then_close() {
        let (transport, mut rx) = ChannelTransport::new();
        transport.send_text("hello").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "hello");

        transport.close();
        assert!(matches!(
            transport.send_text("again"),
            Err(OperatorError::TransportClosed)
        ));
        // Dropping the only sender ends the writer's stream.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_fails_when_writer_is_gone() {
        let (transport, rx) = ChannelTransport::new();
        drop(rx);
        assert!(matches!(transport.send_text("lost"), Err(OperatorError::Send(_))));
    }
}
