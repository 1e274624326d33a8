//! Wire codec: one [`Message`] per newline-terminated JSON record.
//!
//! ```text
//! {"requestId":"calc-17","type":3,"function":"add","arguments":{"a":2,"b":3}}\n
//! ```
//!
//! The codec is stateless. Splitting a byte stream into frames is the job of
//! [`LineDecoder`](super::framing::LineDecoder); [`decode`] and
//! [`try_decode`] expect exactly one record without its terminator.
//!
//! Decoding is lenient: a record that parses but does not describe a known
//! message (unknown `type`, missing or mistyped field, empty `requestId`)
//! becomes [`Message::Unknown`]. Only bytes that are not JSON at all make
//! [`try_decode`] fail, and [`decode`] folds that case into `Unknown` too.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Map;

use super::messages::{ErrorCode, Message, MessageKind};
use crate::constants::{keys, FRAME_DELIMITER};
use crate::value::{Arguments, Value};

/// Errors produced by the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The bytes are not valid JSON.
    Syntax(String),
    /// [`Message::Unknown`] has no wire form.
    UnencodableUnknown,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(msg) => write!(f, "Invalid frame syntax: {msg}"),
            Self::UnencodableUnknown => write!(f, "Unknown message cannot be encoded"),
        }
    }
}

impl std::error::Error for CodecError {}

type Record = Map<String, serde_json::Value>;

/// Encode a message as a single frame, including the trailing newline.
///
/// # Errors
///
/// Fails only for [`Message::Unknown`].
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    let kind = message.kind().ok_or(CodecError::UnencodableUnknown)?;
    let request_id = message.request_id().ok_or(CodecError::UnencodableUnknown)?;

    let mut record = Record::new();
    record.insert(keys::REQUEST_ID.into(), request_id.into());
    record.insert(keys::TYPE.into(), kind.tag().into());

    match message {
        Message::RegisterModuleRequest {
            module_id,
            version,
            dependencies,
            ..
        } => {
            record.insert(keys::MODULE_ID.into(), module_id.as_str().into());
            record.insert(keys::VERSION.into(), version.as_str().into());
            let deps: Record = dependencies
                .iter()
                .map(|(name, req)| (name.clone(), req.as_str().into()))
                .collect();
            record.insert(keys::DEPENDENCIES.into(), deps.into());
        }
        Message::FunctionCallRequest {
            function,
            arguments,
            ..
        } => {
            record.insert(keys::FUNCTION.into(), function.as_str().into());
            let args: Record = arguments
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect();
            record.insert(keys::ARGUMENTS.into(), args.into());
        }
        Message::FunctionCallResponse { data, .. } => {
            record.insert(keys::DATA.into(), data.to_json());
        }
        Message::RegisterHookRequest { hook, .. } => {
            record.insert(keys::HOOK.into(), hook.as_str().into());
        }
        Message::TriggerHookRequest { hook, data, .. } => {
            record.insert(keys::HOOK.into(), hook.as_str().into());
            record.insert(keys::DATA.into(), data.to_json());
        }
        Message::DeclareFunctionRequest { function, .. }
        | Message::DeclareFunctionResponse { function, .. } => {
            record.insert(keys::FUNCTION.into(), function.as_str().into());
        }
        Message::Error { error, .. } => {
            record.insert(keys::ERROR.into(), error.as_wire().into());
        }
        Message::RegisterModuleResponse { .. }
        | Message::RegisterHookResponse { .. }
        | Message::TriggerHookResponse { .. } => {}
        Message::Unknown => return Err(CodecError::UnencodableUnknown),
    }

    let mut buf = serde_json::Value::Object(record).to_string().into_bytes();
    buf.push(FRAME_DELIMITER);
    Ok(buf)
}

/// Decode one frame (without its terminator).
///
/// # Errors
///
/// Returns [`CodecError::Syntax`] if the bytes are not valid JSON. Every
/// other malformed input yields `Ok(Message::Unknown)`.
pub fn try_decode(bytes: &[u8]) -> Result<Message, CodecError> {
    let raw: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| CodecError::Syntax(e.to_string()))?;
    let serde_json::Value::Object(record) = raw else {
        return Ok(Message::Unknown);
    };
    Ok(decode_record(record).unwrap_or(Message::Unknown))
}

/// Decode one frame, mapping every failure to [`Message::Unknown`].
pub fn decode(bytes: &[u8]) -> Message {
    match try_decode(bytes) {
        Ok(Message::Unknown) => {
            log::warn!("[Codec] Unrecognized frame ({} bytes)", bytes.len());
            Message::Unknown
        }
        Ok(message) => message,
        Err(e) => {
            log::warn!("[Codec] {e}");
            Message::Unknown
        }
    }
}

/// Rebuild a typed message from a parsed record. `None` means Unknown.
fn decode_record(mut record: Record) -> Option<Message> {
    let kind = MessageKind::from_tag(record.get(keys::TYPE)?.as_u64()?)?;
    let request_id = take_string(&mut record, keys::REQUEST_ID).filter(|id| !id.is_empty())?;

    let message = match kind {
        MessageKind::Error => {
            let error = match record.remove(keys::ERROR)? {
                serde_json::Value::String(code) => ErrorCode::from_wire(&code),
                serde_json::Value::Null => return None,
                other => ErrorCode::Other(other.to_string()),
            };
            Message::Error { request_id, error }
        }
        MessageKind::RegisterModuleRequest => {
            let module_id = take_string(&mut record, keys::MODULE_ID)?;
            let version = take_string(&mut record, keys::VERSION)?;
            let dependencies = match record.remove(keys::DEPENDENCIES)? {
                serde_json::Value::Object(map) => map
                    .into_iter()
                    .map(|(name, req)| match req {
                        serde_json::Value::String(req) => Some((name, req)),
                        _ => None,
                    })
                    .collect::<Option<BTreeMap<_, _>>>()?,
                _ => return None,
            };
            Message::RegisterModuleRequest {
                request_id,
                module_id,
                version,
                dependencies,
            }
        }
        MessageKind::RegisterModuleResponse => Message::RegisterModuleResponse { request_id },
        MessageKind::FunctionCallRequest => {
            let function = take_string(&mut record, keys::FUNCTION)?;
            let arguments: Arguments = match record.remove(keys::ARGUMENTS)? {
                serde_json::Value::Object(map) => map
                    .into_iter()
                    .map(|(name, value)| (name, Value::from_json(value)))
                    .collect(),
                _ => return None,
            };
            Message::FunctionCallRequest {
                request_id,
                function,
                arguments,
            }
        }
        MessageKind::FunctionCallResponse => {
            let data = Value::from_json(record.remove(keys::DATA)?);
            Message::FunctionCallResponse { request_id, data }
        }
        MessageKind::RegisterHookRequest => {
            let hook = take_string(&mut record, keys::HOOK)?;
            Message::RegisterHookRequest { request_id, hook }
        }
        MessageKind::RegisterHookResponse => Message::RegisterHookResponse { request_id },
        MessageKind::TriggerHookRequest => {
            let hook = take_string(&mut record, keys::HOOK)?;
            // Hosts omit `data` for payload-less triggers.
            let data = record
                .remove(keys::DATA)
                .map(Value::from_json)
                .unwrap_or_default();
            Message::TriggerHookRequest {
                request_id,
                hook,
                data,
            }
        }
        MessageKind::TriggerHookResponse => Message::TriggerHookResponse { request_id },
        MessageKind::DeclareFunctionRequest => {
            let function = take_string(&mut record, keys::FUNCTION)?;
            Message::DeclareFunctionRequest {
                request_id,
                function,
            }
        }
        MessageKind::DeclareFunctionResponse => {
            let function = take_string(&mut record, keys::FUNCTION)?;
            Message::DeclareFunctionResponse {
                request_id,
                function,
            }
        }
    };
    Some(message)
}

fn take_string(record: &mut Record, key: &str) -> Option<String> {
    match record.remove(key)? {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(mut frame: Vec<u8>) -> Vec<u8> {
        assert_eq!(frame.pop(), Some(b'\n'));
        frame
    }

    fn all_variants() -> Vec<Message> {
        let mut deps = BTreeMap::new();
        deps.insert("juno.core".to_string(), "^1.0".to_string());
        let mut args = Arguments::new();
        args.insert("a".into(), Value::Signed(2));
        args.insert("list".into(), Value::from(vec!["x", "y"]));
        vec![
            Message::RegisterModuleRequest {
                request_id: "m-1".into(),
                module_id: "m".into(),
                version: "1.0.0".into(),
                dependencies: deps,
            },
            Message::RegisterModuleResponse {
                request_id: "m-1".into(),
            },
            Message::FunctionCallRequest {
                request_id: "m-2".into(),
                function: "other.add".into(),
                arguments: args,
            },
            Message::FunctionCallResponse {
                request_id: "m-2".into(),
                data: Value::Float(0.5),
            },
            Message::RegisterHookRequest {
                request_id: "m-3".into(),
                hook: "tick".into(),
            },
            Message::RegisterHookResponse {
                request_id: "m-3".into(),
            },
            Message::TriggerHookRequest {
                request_id: "m-4".into(),
                hook: "tick".into(),
                data: Value::Null,
            },
            Message::TriggerHookResponse {
                request_id: "m-4".into(),
            },
            Message::DeclareFunctionRequest {
                request_id: "m-5".into(),
                function: "add".into(),
            },
            Message::DeclareFunctionResponse {
                request_id: "m-5".into(),
                function: "add".into(),
            },
            Message::Error {
                request_id: "m-6".into(),
                error: ErrorCode::UnknownModule,
            },
        ]
    }

    #[test]
    fn test_every_variant_round_trips() {
        for message in all_variants() {
            let frame = encode(&message).unwrap();
            assert_eq!(frame.iter().filter(|&&b| b == b'\n').count(), 1);
            assert_eq!(decode(&strip(frame)), message);
        }
    }

    #[test]
    fn test_function_response_wire_bytes() {
        let frame = encode(&Message::FunctionCallResponse {
            request_id: "h-1".into(),
            data: Value::Signed(5),
        })
        .unwrap();
        assert_eq!(frame, b"{\"requestId\":\"h-1\",\"type\":4,\"data\":5}\n".to_vec());
    }

    #[test]
    fn test_error_wire_bytes() {
        let frame = encode(&Message::Error {
            request_id: "h-2".into(),
            error: ErrorCode::UnknownFunction,
        })
        .unwrap();
        assert_eq!(
            frame,
            b"{\"requestId\":\"h-2\",\"type\":0,\"error\":\"unknownFunction\"}\n".to_vec()
        );
    }

    #[test]
    fn test_unknown_cannot_be_encoded() {
        assert_eq!(encode(&Message::Unknown), Err(CodecError::UnencodableUnknown));
    }

    #[test]
    fn test_invalid_json_is_a_syntax_error() {
        assert!(matches!(try_decode(b"{not json"), Err(CodecError::Syntax(_))));
        assert_eq!(decode(b"{not json"), Message::Unknown);
    }

    #[test]
    fn test_semantically_wrong_records_decode_to_unknown() {
        let cases: &[&[u8]] = &[
            b"[1,2,3]",
            b"\"hello\"",
            br#"{"requestId":"x-1","type":42}"#,
            br#"{"requestId":"x-1","type":-1}"#,
            br#"{"requestId":"x-1","type":"3"}"#,
            br#"{"requestId":"x-1"}"#,
            br#"{"type":2}"#,
            br#"{"requestId":"","type":2}"#,
            br#"{"requestId":7,"type":2}"#,
            br#"{"requestId":"x-1","type":3,"arguments":{}}"#,
            br#"{"requestId":"x-1","type":3,"function":"f","arguments":[1]}"#,
            br#"{"requestId":"x-1","type":4}"#,
            br#"{"requestId":"x-1","type":5}"#,
            br#"{"requestId":"x-1","type":0}"#,
            br#"{"requestId":"x-1","type":1,"moduleId":"m","version":"1"}"#,
            br#"{"requestId":"x-1","type":1,"moduleId":"m","version":"1","dependencies":{"a":1}}"#,
            br#"{"requestId":"x-1","type":10}"#,
        ];
        for case in cases {
            assert_eq!(
                try_decode(case),
                Ok(Message::Unknown),
                "{}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn test_trigger_without_data_defaults_to_null() {
        let message = decode(br#"{"requestId":"h-9","type":7,"hook":"juno.activated"}"#);
        assert_eq!(
            message,
            Message::TriggerHookRequest {
                request_id: "h-9".into(),
                hook: "juno.activated".into(),
                data: Value::Null,
            }
        );
    }

    #[test]
    fn test_unrecognized_error_code_is_preserved() {
        let message = decode(br#"{"requestId":"m-1","type":0,"error":"rateLimited"}"#);
        assert_eq!(
            message,
            Message::Error {
                request_id: "m-1".into(),
                error: ErrorCode::Other("rateLimited".into()),
            }
        );
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let message = decode(br#"{"requestId":"h-1","type":6,"extra":true}"#);
        assert_eq!(
            message,
            Message::RegisterHookResponse {
                request_id: "h-1".into()
            }
        );
    }
}
