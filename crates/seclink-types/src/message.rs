//! Message types carried by seclink channels.
//!
//! The transport treats these as opaque values handed to a wire protocol.
//! Correlating replies with requests is left to the layers above.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::id::MessageId;

/// A message exchanged between two peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Message {
    pub id: MessageId,
    /// Set when this message answers an earlier one.
    pub replied_id: Option<MessageId>,
    pub body: MessageBody,
}

/// Payload of a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum MessageBody {
    /// Keepalive. Carries no data.
    Ping,
    /// UTF-8 text.
    Text(String),
    /// Arbitrary bytes.
    RawData(Vec<u8>),
}

impl Message {
    #[must_use]
    pub fn new(body: MessageBody) -> Self {
        Self {
            id: MessageId::new(),
            replied_id: None,
            body,
        }
    }

    #[must_use]
    pub fn ping() -> Self {
        Self::new(MessageBody::Ping)
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(MessageBody::Text(text.into()))
    }

    #[must_use]
    pub fn raw(data: impl Into<Vec<u8>>) -> Self {
        Self::new(MessageBody::RawData(data.into()))
    }

    /// Build a reply to `original` carrying `body`.
    #[must_use]
    pub fn reply_to(original: &Message, body: MessageBody) -> Self {
        Self {
            id: MessageId::new(),
            replied_id: Some(original.id),
            body,
        }
    }

    /// Whether this message answers another one.
    pub fn is_reply(&self) -> bool {
        self.replied_id.is_some()
    }
}

impl std::fmt::Display for MessageBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ping => write!(f, "ping"),
            Self::Text(text) => write!(f, "text({text})"),
            Self::RawData(data) => write!(f, "raw({} bytes)", data.len()),
        }
    }
}
