//! Protocol and transport errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("failed to bind listener: {0}")]
    Bind(String),

    #[error("message could not be sent: {0}")]
    SendFailed(String),

    #[error("channel is not connected")]
    NotConnected,

    #[error("channel already started")]
    AlreadyStarted,

    #[error("listener already running")]
    AlreadyRunning,

    #[error("serialisation error: {0}")]
    Serialization(String),

    #[error("deserialisation error: {0}")]
    Deserialization(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
