//! Library-level error type.

use crate::channel::ChannelError;
use crate::protocol::{CodecError, ErrorCode};

/// Errors surfaced by [`JunoModule`](crate::JunoModule) operations and by
/// the handles they return.
///
/// `Clone` so that one connection failure can be delivered to every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    /// A request with this id is already awaiting a response.
    DuplicateRequestId(String),
    /// The module has already been registered on this runtime.
    AlreadyRegistered,
    /// The runtime has not been initialized.
    NotInitialized,
    /// The connection closed before the request completed.
    ConnectionClosed,
    /// The named function is not declared.
    UnknownFunction(String),
    /// A function or hook handler failed.
    HandlerFailure(String),
    /// The host rejected the request.
    Host(ErrorCode),
    /// The transport failed.
    Channel(ChannelError),
    /// A message could not be encoded.
    Codec(CodecError),
}

impl ModuleError {
    /// Translate a wire error code received for one of our requests.
    pub fn from_code(code: ErrorCode) -> Self {
        match code {
            ErrorCode::UnknownFunction => Self::UnknownFunction(String::new()),
            ErrorCode::HandlerFailure => Self::HandlerFailure(String::new()),
            other => Self::Host(other),
        }
    }

    /// The wire error code reported to the host for this failure.
    pub fn to_code(&self) -> ErrorCode {
        match self {
            Self::UnknownFunction(_) => ErrorCode::UnknownFunction,
            Self::Host(code) => code.clone(),
            _ => ErrorCode::HandlerFailure,
        }
    }
}

impl std::fmt::Display for ModuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateRequestId(id) => write!(f, "Request id already pending: {id}"),
            Self::AlreadyRegistered => write!(f, "Module already registered"),
            Self::NotInitialized => write!(f, "Module not initialized"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::UnknownFunction(name) if name.is_empty() => write!(f, "Unknown function"),
            Self::UnknownFunction(name) => write!(f, "Unknown function: {name}"),
            Self::HandlerFailure(msg) if msg.is_empty() => write!(f, "Handler failed"),
            Self::HandlerFailure(msg) => write!(f, "Handler failed: {msg}"),
            Self::Host(code) => write!(f, "Host error: {code}"),
            Self::Channel(e) => write!(f, "Channel error: {e}"),
            Self::Codec(e) => write!(f, "Codec error: {e}"),
        }
    }
}

impl std::error::Error for ModuleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Channel(e) => Some(e),
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ChannelError> for ModuleError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Closed => Self::ConnectionClosed,
            other => Self::Channel(other),
        }
    }
}

impl From<CodecError> for ModuleError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

/// Result alias for module operations.
pub type Result<T, E = ModuleError> = std::result::Result<T, E>;
