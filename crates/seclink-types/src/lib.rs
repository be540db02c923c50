//! Shared types for seclink.
//!
//! Endpoint addressing and the message model exchanged over secure
//! channels. Kept free of I/O so every other crate can depend on it.

pub mod endpoint;
pub mod id;
pub mod message;

pub use endpoint::{Endpoint, EndpointError};
pub use id::MessageId;
pub use message::{Message, MessageBody};
