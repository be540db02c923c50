//! Wire format: length-prefixed bincode v2 frames.
//!
//! Each message on the wire is:
//!   [4 bytes big-endian length][bincode v2 payload]
//!
//! Channels only depend on the [`WireProtocol`] trait; [`BincodeWireProtocol`]
//! is the stock implementation.

use std::fmt;
use std::marker::PhantomData;

use bincode::{Decode, Encode};
use tracing::trace;

use crate::error::ProtocolError;

/// Maximum message size (1 MiB). Prevents allocation bombs.
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

const LENGTH_PREFIX: usize = 4;

/// Converts messages to bytes and back.
///
/// Decoding is incremental: bytes arrive in arbitrary chunks, and a partial
/// trailing message must be kept until the rest of it shows up. Every channel
/// owns its own instance. Listeners clone an unused prototype for each
/// accepted connection.
pub trait WireProtocol: Clone + Send + Sync + 'static {
    type Message: Send + 'static;

    /// Serialise a whole message into one frame.
    fn encode(&self, message: &Self::Message) -> Result<Vec<u8>, ProtocolError>;

    /// Feed received bytes; returns every message completed by them, in order.
    fn decode(&mut self, bytes: &[u8]) -> Result<Vec<Self::Message>, ProtocolError>;
}

/// Length-prefixed bincode framing for any `Encode + Decode` message type.
pub struct BincodeWireProtocol<M> {
    pending: Vec<u8>,
    _message: PhantomData<fn() -> M>,
}

impl<M> BincodeWireProtocol<M> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            _message: PhantomData,
        }
    }

    /// Bytes held back while waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

impl<M> Default for BincodeWireProtocol<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for BincodeWireProtocol<M> {
    fn clone(&self) -> Self {
        Self {
            pending: self.pending.clone(),
            _message: PhantomData,
        }
    }
}

impl<M> fmt::Debug for BincodeWireProtocol<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BincodeWireProtocol")
            .field("buffered", &self.pending.len())
            .finish()
    }
}

impl<M> WireProtocol for BincodeWireProtocol<M>
where
    M: Encode + Decode<()> + Send + 'static,
{
    type Message = M;

    fn encode(&self, message: &M) -> Result<Vec<u8>, ProtocolError> {
        encode_message(message)
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<Vec<M>, ProtocolError> {
        self.pending.extend_from_slice(bytes);

        let mut messages = Vec::new();
        let mut offset = 0;
        while self.pending.len() - offset >= LENGTH_PREFIX {
            let mut len_buf = [0u8; LENGTH_PREFIX];
            len_buf.copy_from_slice(&self.pending[offset..offset + LENGTH_PREFIX]);
            let len = u32::from_be_bytes(len_buf);
            if len > MAX_MESSAGE_SIZE {
                return Err(ProtocolError::Deserialization(format!(
                    "message size {len} exceeds maximum {MAX_MESSAGE_SIZE}"
                )));
            }

            let start = offset + LENGTH_PREFIX;
            let end = start + len as usize;
            if self.pending.len() < end {
                break;
            }
            messages.push(decode_message(&self.pending[start..end])?);
            trace!(len, "decoded frame");
            offset = end;
        }
        self.pending.drain(..offset);
        Ok(messages)
    }
}

/// Encode a message to a length-prefixed byte vector.
pub fn encode_message<T: Encode>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let config = bincode::config::standard();
    let payload = bincode::encode_to_vec(msg, config)
        .map_err(|e| ProtocolError::Serialization(e.to_string()))?;

    let len = u32::try_from(payload.len())
        .map_err(|_| ProtocolError::Serialization("message too large".to_string()))?;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::Serialization(format!(
            "message size {len} exceeds maximum {MAX_MESSAGE_SIZE}"
        )));
    }

    let mut buf = Vec::with_capacity(LENGTH_PREFIX + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a message from a bincode v2 payload (without the length prefix).
pub fn decode_message<T: Decode<()>>(payload: &[u8]) -> Result<T, ProtocolError> {
    let config = bincode::config::standard();
    let (msg, _) = bincode::decode_from_slice(payload, config)
        .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
    Ok(msg)
}
