//! Juno Module - client runtime for joining a Juno host.
//!
//! A module connects to the host over a local duplex byte stream, registers
//! itself, exposes functions the host can call, and subscribes to hooks the
//! host broadcasts.
//!
//! # Architecture
//!
//! - **Protocol** - newline-delimited JSON frames and the closed message union
//! - **Channel** - transport halves (Unix socket or any tokio stream pair)
//! - **Runtime** - request correlation, activation gating, inbound dispatch
//!
//! # Example
//!
//! ```ignore
//! use juno_module::{Arguments, JunoModule, ModuleConfig, ModuleDescriptor, Value};
//!
//! let module = JunoModule::with_config(
//!     ModuleDescriptor::new("calc", "1.0.0"),
//!     ModuleConfig::from_env(),
//! );
//! module.initialize_unix().await?;
//!
//! let _declared = module.declare_function("add", |args: Arguments| async move {
//!     let a = args.get("a").and_then(Value::as_i64).unwrap_or(0);
//!     let b = args.get("b").and_then(Value::as_i64).unwrap_or(0);
//!     Ok(Value::from(a + b))
//! })?;
//!
//! let sum = module.call_function("other.add", Arguments::new())?.await?;
//! ```
//!
//! # Modules
//!
//! - [`value`] - dynamic payload values
//! - [`protocol`] - message types, codec and framing
//! - [`channel`] - duplex channel abstraction
//! - [`runtime`] - the module runtime
//! - [`config`] - configuration loading

pub mod channel;
pub mod config;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod runtime;
pub mod value;

// Re-export commonly used types
pub use channel::stream::StreamChannel;
pub use channel::unix::UnixSocketChannel;
pub use channel::{Channel, ChannelError, ChannelReader, ChannelWriter};
pub use config::ModuleConfig;
pub use error::ModuleError;
pub use protocol::{ErrorCode, Message};
pub use runtime::pending::ResponseHandle;
pub use runtime::{JunoModule, ModuleDescriptor, ModuleState};
pub use value::{Arguments, Value};
