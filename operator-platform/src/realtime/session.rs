use camwatch_common::{Envelope, InboundMessage};
use futures::{Stream, StreamExt};
use std::fmt;

use super::hub::{ConnectionHandle, ConnectionHub};

/// Drive one observer until its inbound stream ends or errors, then
/// disconnect it from the hub.
///
/// `{"type":"ping"}` is answered with `{"type":"pong","data":{}}`. Anything
/// else is ignored.
pub async fn run_session<S, E>(hub: &ConnectionHub, handle: ConnectionHandle, mut inbound: S)
where
    S: Stream<Item = Result<String, E>> + Unpin,
    E: fmt::Display,
{
    while let Some(frame) = inbound.next().await {
        let text = match frame {
            Ok(text) => text,
            Err(e) => {
                tracing::info!(connection_id = %handle.id(), error = %e, "Observer receive failed");
                break;
            }
        };

        match InboundMessage::parse(&text) {
            InboundMessage::Ping => {
                if let Err(e) = handle.send(&Envelope::pong()) {
                    tracing::warn!(connection_id = %handle.id(), error = %e, "Failed to answer ping");
                    break;
                }
            }
            InboundMessage::Unrecognized(kind) => {
                tracing::debug!(connection_id = %handle.id(), message_type = %kind, "Ignoring unrecognized message");
            }
            InboundMessage::Malformed => {
                tracing::debug!(connection_id = %handle.id(), "Ignoring malformed message");
            }
        }
    }

    hub.disconnect(&handle);
}
