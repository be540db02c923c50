//! Notifications raised by channels and listeners.
//!
//! Observers are called synchronously from the I/O task that produced the
//! event, so implementations must not block. The `mpsc` implementations
//! hand events to another task instead.

use tokio::sync::mpsc;

use crate::channel::SecureChannel;
use crate::wire::WireProtocol;

/// Receives the events of one [`SecureChannel`].
pub trait ChannelObserver<M>: Send + Sync + 'static {
    /// One call per decoded message, in receive order.
    fn on_message_received(&self, message: M);

    /// One call per successful send.
    fn on_message_sent(&self, _message: &M) {}

    /// Called exactly once, when the channel becomes disconnected.
    fn on_disconnected(&self) {}
}

/// Receives channels produced by a listener.
pub trait ConnectionObserver<P: WireProtocol>: Send + Sync + 'static {
    fn on_channel_connected(&self, channel: SecureChannel<P>);
}

/// A channel event as delivered through an `mpsc` channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent<M> {
    MessageReceived(M),
    MessageSent(M),
    Disconnected,
}

impl<M> ChannelObserver<M> for mpsc::UnboundedSender<ChannelEvent<M>>
where
    M: Clone + Send + 'static,
{
    fn on_message_received(&self, message: M) {
        let _ = self.send(ChannelEvent::MessageReceived(message));
    }

    fn on_message_sent(&self, message: &M) {
        let _ = self.send(ChannelEvent::MessageSent(message.clone()));
    }

    fn on_disconnected(&self) {
        let _ = self.send(ChannelEvent::Disconnected);
    }
}

impl<P: WireProtocol> ConnectionObserver<P> for mpsc::UnboundedSender<SecureChannel<P>> {
    fn on_channel_connected(&self, channel: SecureChannel<P>) {
        let _ = self.send(channel);
    }
}
