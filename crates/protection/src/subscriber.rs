//! Alert delivery handles.
//!
//! The registry only sees this capability; the transport that owns the
//! other end (a WebSocket session, a test channel) stays outside.

use thiserror::Error;
use tokio::sync::mpsc;

pub type SubscriberId = u64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("subscriber closed")]
    Closed,

    #[error("send failed: {0}")]
    Send(String),
}

pub trait Subscriber: Send + Sync {
    /// Stable identity; subscribing the same id twice is a no-op.
    fn id(&self) -> SubscriberId;

    fn send(&self, message: &str) -> Result<(), DeliveryError>;

    fn is_open(&self) -> bool;
}

/// Subscriber backed by an unbounded channel. The receiver side is handed
/// to whoever forwards messages to the client.
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    id: SubscriberId,
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSubscriber {
    /// `id` comes from whoever tracks subscriptions, usually
    /// [`ProtectionRegistry::next_subscriber_id`](crate::ProtectionRegistry::next_subscriber_id).
    pub fn channel(id: SubscriberId) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }
}

impl Subscriber for ChannelSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn send(&self, message: &str) -> Result<(), DeliveryError> {
        self.tx
            .send(message.to_string())
            .map_err(|_| DeliveryError::Closed)
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_subscriber_delivers_until_dropped() {
        let (sub, mut rx) = ChannelSubscriber::channel(7);
        assert_eq!(sub.id(), 7);
        assert!(sub.is_open());
        sub.send("hello").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "hello");

        drop(rx);
        assert!(!sub.is_open());
        assert_eq!(sub.send("again"), Err(DeliveryError::Closed));
    }

}
