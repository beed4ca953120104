//! Transport seam. The overlay never opens sockets itself; whatever
//! owns the XMPP stream implements [`Transport`] for outbound stanzas
//! and feeds inbound ones through a [`TransportEvent`] channel.

use async_trait::async_trait;
use tokio::sync::mpsc;
use yts_domain::{Error, Result};
use yts_protocol::Element;

/// Outbound half of the stream.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one stanza. Errors mean the stream is gone, not that the
    /// remote rejected anything.
    async fn send(&self, stanza: Element) -> Result<()>;
}

/// Inbound half of the stream, delivered to the connection event loop.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A complete stanza arrived.
    Stanza(Element),
    /// The stream closed; no further stanzas will arrive.
    Disconnected,
}

/// In-process transport backed by an mpsc channel. The receiver side
/// plays the server/peer; tests drive the whole overlay through it.
pub struct ChannelTransport {
    tx: mpsc::Sender<Element>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, stanza: Element) -> Result<()> {
        self.tx
            .send(stanza)
            .await
            .map_err(|_| Error::NotConnected)
    }
}

/// Build a [`ChannelTransport`] plus the receiver that observes what
/// the overlay sends.
pub fn channel_transport(capacity: usize) -> (ChannelTransport, mpsc::Receiver<Element>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelTransport { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_transport_delivers() {
        let (transport, mut rx) = channel_transport(4);
        transport
            .send(Element::plain("presence"))
            .await
            .unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got.name(), "presence");
    }

    #[tokio::test]
    async fn closed_receiver_reads_as_disconnected() {
        let (transport, rx) = channel_transport(1);
        drop(rx);
        assert!(matches!(
            transport.send(Element::plain("iq")).await,
            Err(Error::NotConnected)
        ));
    }
}
