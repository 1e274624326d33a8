//! Protocol message types.
//!
//! Every frame on the wire is one [`Message`]. All variants except
//! [`Message::Unknown`] carry a `request_id` and map to a fixed numeric kind
//! tag (see [`MessageKind`]).

use std::collections::BTreeMap;
use std::fmt;

use crate::constants::kinds;
use crate::value::{Arguments, Value};

/// Numeric kind tag carried in the `type` field of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum MessageKind {
    /// Error reply.
    Error = kinds::ERROR,
    /// Module registration request.
    RegisterModuleRequest = kinds::REGISTER_MODULE_REQUEST,
    /// Module registration acknowledgement.
    RegisterModuleResponse = kinds::REGISTER_MODULE_RESPONSE,
    /// Function call request.
    FunctionCallRequest = kinds::FUNCTION_CALL_REQUEST,
    /// Function call result.
    FunctionCallResponse = kinds::FUNCTION_CALL_RESPONSE,
    /// Hook listener registration request.
    RegisterHookRequest = kinds::REGISTER_HOOK_REQUEST,
    /// Hook listener registration acknowledgement.
    RegisterHookResponse = kinds::REGISTER_HOOK_RESPONSE,
    /// Hook trigger request.
    TriggerHookRequest = kinds::TRIGGER_HOOK_REQUEST,
    /// Hook trigger acknowledgement.
    TriggerHookResponse = kinds::TRIGGER_HOOK_RESPONSE,
    /// Function declaration request.
    DeclareFunctionRequest = kinds::DECLARE_FUNCTION_REQUEST,
    /// Function declaration acknowledgement.
    DeclareFunctionResponse = kinds::DECLARE_FUNCTION_RESPONSE,
}

impl MessageKind {
    /// Creates a kind from its numeric tag.
    #[must_use]
    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            kinds::ERROR => Some(Self::Error),
            kinds::REGISTER_MODULE_REQUEST => Some(Self::RegisterModuleRequest),
            kinds::REGISTER_MODULE_RESPONSE => Some(Self::RegisterModuleResponse),
            kinds::FUNCTION_CALL_REQUEST => Some(Self::FunctionCallRequest),
            kinds::FUNCTION_CALL_RESPONSE => Some(Self::FunctionCallResponse),
            kinds::REGISTER_HOOK_REQUEST => Some(Self::RegisterHookRequest),
            kinds::REGISTER_HOOK_RESPONSE => Some(Self::RegisterHookResponse),
            kinds::TRIGGER_HOOK_REQUEST => Some(Self::TriggerHookRequest),
            kinds::TRIGGER_HOOK_RESPONSE => Some(Self::TriggerHookResponse),
            kinds::DECLARE_FUNCTION_REQUEST => Some(Self::DeclareFunctionRequest),
            kinds::DECLARE_FUNCTION_RESPONSE => Some(Self::DeclareFunctionResponse),
            _ => None,
        }
    }

    /// Returns the numeric tag of this kind.
    #[must_use]
    pub const fn tag(self) -> u64 {
        self as u64
    }
}

/// Error codes exchanged in [`Message::Error`] frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The request id was missing or malformed.
    InvalidRequestId,
    /// The `type` tag was not understood.
    UnknownRequestType,
    /// A required field was missing or had the wrong shape.
    MalformedRequest,
    /// The module sent a request before registering.
    UnregisteredModule,
    /// The request addressed a module the host does not know.
    UnknownModule,
    /// The request named a function that is not declared.
    UnknownFunction,
    /// A registered handler failed while serving the request.
    HandlerFailure,
    /// Any code this runtime does not recognise, kept verbatim.
    Other(String),
}

impl ErrorCode {
    /// Parses a wire error code. Unrecognised codes become [`ErrorCode::Other`].
    pub fn from_wire(code: &str) -> Self {
        match code {
            "invalidRequestId" => Self::InvalidRequestId,
            "unknownRequest" => Self::UnknownRequestType,
            "malformedRequest" => Self::MalformedRequest,
            "unregisteredModule" => Self::UnregisteredModule,
            "unknownModule" => Self::UnknownModule,
            "unknownFunction" => Self::UnknownFunction,
            "handlerFailure" => Self::HandlerFailure,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the wire representation of this code.
    pub fn as_wire(&self) -> &str {
        match self {
            Self::InvalidRequestId => "invalidRequestId",
            Self::UnknownRequestType => "unknownRequest",
            Self::MalformedRequest => "malformedRequest",
            Self::UnregisteredModule => "unregisteredModule",
            Self::UnknownModule => "unknownModule",
            Self::UnknownFunction => "unknownFunction",
            Self::HandlerFailure => "handlerFailure",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// A single protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Announces the module to the host.
    RegisterModuleRequest {
        /// Correlation id.
        request_id: String,
        /// Module identifier.
        module_id: String,
        /// Module version.
        version: String,
        /// Required modules and their version requirements.
        dependencies: BTreeMap<String, String>,
    },
    /// Host accepted the registration.
    RegisterModuleResponse {
        /// Correlation id.
        request_id: String,
    },
    /// Invoke a function (host → module or module → host).
    FunctionCallRequest {
        /// Correlation id.
        request_id: String,
        /// Function name.
        function: String,
        /// Named arguments.
        arguments: Arguments,
    },
    /// Result of a function call.
    FunctionCallResponse {
        /// Correlation id of the call.
        request_id: String,
        /// Returned value.
        data: Value,
    },
    /// Subscribe to a hook.
    RegisterHookRequest {
        /// Correlation id.
        request_id: String,
        /// Hook name.
        hook: String,
    },
    /// Hook subscription acknowledged.
    RegisterHookResponse {
        /// Correlation id.
        request_id: String,
    },
    /// Trigger a hook with a payload.
    TriggerHookRequest {
        /// Correlation id.
        request_id: String,
        /// Hook name.
        hook: String,
        /// Payload delivered to listeners.
        data: Value,
    },
    /// Hook trigger acknowledged.
    TriggerHookResponse {
        /// Correlation id.
        request_id: String,
    },
    /// Tell the host this module serves a function.
    DeclareFunctionRequest {
        /// Correlation id.
        request_id: String,
        /// Function name.
        function: String,
    },
    /// Function declaration acknowledged.
    DeclareFunctionResponse {
        /// Correlation id.
        request_id: String,
        /// Function name.
        function: String,
    },
    /// A request failed.
    Error {
        /// Correlation id of the failed request.
        request_id: String,
        /// Why it failed.
        error: ErrorCode,
    },
    /// Anything that could not be decoded into one of the above.
    Unknown,
}

impl Message {
    /// The kind tag of this message, `None` for [`Message::Unknown`].
    pub fn kind(&self) -> Option<MessageKind> {
        let kind = match self {
            Self::RegisterModuleRequest { .. } => MessageKind::RegisterModuleRequest,
            Self::RegisterModuleResponse { .. } => MessageKind::RegisterModuleResponse,
            Self::FunctionCallRequest { .. } => MessageKind::FunctionCallRequest,
            Self::FunctionCallResponse { .. } => MessageKind::FunctionCallResponse,
            Self::RegisterHookRequest { .. } => MessageKind::RegisterHookRequest,
            Self::RegisterHookResponse { .. } => MessageKind::RegisterHookResponse,
            Self::TriggerHookRequest { .. } => MessageKind::TriggerHookRequest,
            Self::TriggerHookResponse { .. } => MessageKind::TriggerHookResponse,
            Self::DeclareFunctionRequest { .. } => MessageKind::DeclareFunctionRequest,
            Self::DeclareFunctionResponse { .. } => MessageKind::DeclareFunctionResponse,
            Self::Error { .. } => MessageKind::Error,
            Self::Unknown => return None,
        };
        Some(kind)
    }

    /// The request id, `None` for [`Message::Unknown`].
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::RegisterModuleRequest { request_id, .. }
            | Self::RegisterModuleResponse { request_id }
            | Self::FunctionCallRequest { request_id, .. }
            | Self::FunctionCallResponse { request_id, .. }
            | Self::RegisterHookRequest { request_id, .. }
            | Self::RegisterHookResponse { request_id }
            | Self::TriggerHookRequest { request_id, .. }
            | Self::TriggerHookResponse { request_id }
            | Self::DeclareFunctionRequest { request_id, .. }
            | Self::DeclareFunctionResponse { request_id, .. }
            | Self::Error { request_id, .. } => Some(request_id),
            Self::Unknown => None,
        }
    }

    /// Returns true for [`Message::Unknown`].
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}
