//! Push transport seam.
//!
//! The socket adapter and the sync core talk over two channels: inbound
//! [`TransportEvent`]s consumed by the reconciler loop, and outbound
//! [`ClientEvent`]s emitted through a [`TransportHandle`].

use serde_json::Value;
use tokio::sync::mpsc;

use courier_shared::constants::EVENT_CHANNEL_CAPACITY;
use courier_shared::protocol::Frame;
use courier_shared::{ClientEvent, ProtocolError};

use crate::error::{ClientError, Result};

/// What the socket adapter reports to the core.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected { reason: String },
    /// A named server event with its JSON payload.
    Event { name: String, data: Value },
}

impl TransportEvent {
    /// Build an event from a JSON frame `{"event": ..., "data": ...}`.
    pub fn from_frame(text: &str) -> std::result::Result<Self, ProtocolError> {
        let frame: Frame = serde_json::from_str(text)?;
        Ok(Self::Event {
            name: frame.event,
            data: frame.data,
        })
    }
}

/// Outbound half used by the core to emit client events.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    tx: mpsc::Sender<ClientEvent>,
}

impl TransportHandle {
    pub fn new(tx: mpsc::Sender<ClientEvent>) -> Self {
        Self { tx }
    }

    /// Queue an event, waiting for channel capacity.
    pub async fn emit(&self, event: ClientEvent) -> Result<()> {
        let name = event.name();
        self.tx.send(event).await.map_err(|_| {
            tracing::warn!(event = name, "transport channel closed");
            ClientError::ChannelClosed
        })
    }

    /// Queue an event without waiting. A full channel drops the event and
    /// reports [`ClientError::ChannelFull`].
    pub fn try_emit(&self, event: ClientEvent) -> Result<()> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(ClientError::ChannelFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ClientError::ChannelClosed),
        }
    }
}

/// Adapter-facing ends: push inbound events, drain outbound ones.
#[derive(Debug)]
pub struct TransportLink {
    pub inbound: mpsc::Sender<TransportEvent>,
    pub outbound: mpsc::Receiver<ClientEvent>,
}

/// Core-facing ends.
#[derive(Debug)]
pub struct TransportPorts {
    pub handle: TransportHandle,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Create both channel pairs.
pub fn transport_channels() -> (TransportLink, TransportPorts) {
    let (in_tx, in_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (out_tx, out_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    (
        TransportLink {
            inbound: in_tx,
            outbound: out_rx,
        },
        TransportPorts {
            handle: TransportHandle::new(out_tx),
            events: in_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use courier_shared::protocol::PresenceNotice;

    use super::*;

    #[test]
    fn test_frame_to_event() {
        let ev = TransportEvent::from_frame(r#"{"event":"typing:start","data":{"conversation_id":1,"user_id":2}}"#)
            .unwrap();
        match ev {
            TransportEvent::Event { name, data } => {
                assert_eq!(name, "typing:start");
                assert_eq!(data["user_id"], 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(TransportEvent::from_frame("not json").is_err());
    }

    #[tokio::test]
    async fn test_emit_reaches_link() {
        let (mut link, ports) = transport_channels();
        let ev = ClientEvent::PresenceUpdate(PresenceNotice { is_online: true });
        ports.handle.emit(ev.clone()).await.unwrap();
        assert_eq!(link.outbound.recv().await, Some(ev));
    }

    #[test]
    fn test_try_emit_reports_full_channel() {
        let (mut link, ports) = transport_channels();
        let ev = ClientEvent::PresenceUpdate(PresenceNotice { is_online: true });
        for _ in 0..EVENT_CHANNEL_CAPACITY {
            ports.handle.try_emit(ev.clone()).unwrap();
        }

        let err = ports.handle.try_emit(ev.clone()).unwrap_err();
        assert!(matches!(err, ClientError::ChannelFull));

        assert_eq!(link.outbound.try_recv().ok(), Some(ev.clone()));
        ports.handle.try_emit(ev).unwrap();
    }

    #[tokio::test]
    async fn test_emit_after_link_dropped() {
        let (link, ports) = transport_channels();
        drop(link);
        let err = ports
            .handle
            .try_emit(ClientEvent::PresenceUpdate(PresenceNotice { is_online: false }))
            .unwrap_err();
        assert!(matches!(err, ClientError::ChannelClosed));
    }
}
