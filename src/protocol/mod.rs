//! Juno wire protocol.
//!
//! - [`messages`]: the closed [`Message`] union and its [`ErrorCode`]s
//! - [`codec`]: one message to and from one JSON line
//! - [`framing`]: splitting the inbound byte stream into lines

pub mod codec;
pub mod framing;
pub mod messages;

pub use codec::{decode, encode, try_decode, CodecError};
pub use framing::LineDecoder;
pub use messages::{ErrorCode, Message, MessageKind};
