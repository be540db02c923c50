//! TLS over TCP secure channels for seclink.
//!
//! This crate handles the certificate trust policy, rustls configuration,
//! message framing (via bincode v2), the secure channel state machine, and
//! the client connector and connection listener that produce channels.

pub mod channel;
pub mod connector;
pub mod error;
pub mod listener;
pub mod observer;
pub mod tls;
pub mod trust;
pub mod wire;

pub use channel::{CommunicationState, SecureChannel};
pub use connector::{connect, ClientConnector, ConnectorOptions};
pub use error::ProtocolError;
pub use listener::{ConnectionListener, ListenSocket, ListenerOptions, SocketBinder, TcpBinder};
pub use observer::{ChannelEvent, ChannelObserver, ConnectionObserver};
pub use tls::ServerIdentity;
pub use trust::{PolicyErrors, TrustPolicy, TrustPolicyVerifier};
pub use wire::{BincodeWireProtocol, WireProtocol};
