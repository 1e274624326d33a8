//! Module runtime: connection lifecycle, request correlation and dispatch.
//!
//! # Architecture
//!
//! ```text
//!                      ┌────────────────────── JunoModule ──────────────────────┐
//!  call_function ────▶ │ RequestIdGenerator → PendingRequests.register          │
//!  trigger_hook        │        │                                               │
//!  declare_function    │        ▼                                               │
//!  register_hook       │  OutboundGate ──(buffer until activated)──▶ mpsc ──────┼──▶ write loop ──▶ ChannelWriter
//!                      │        ▲                                               │
//!                      │        │ replies (never buffered)                      │
//!                      │  dispatch task (one per frame) ◀── LineDecoder ◀───────┼─── read loop ◀── ChannelReader
//!                      │        │                                               │
//!                      │        ├─ responses → PendingRequests.resolve / fail   │
//!                      │        ├─ FunctionCallRequest → FunctionRegistry       │
//!                      │        └─ TriggerHookRequest → HookRegistry / gate     │
//!                      └────────────────────────────────────────────────────────┘
//! ```
//!
//! The read loop only splits frames. Each complete frame is decoded and
//! dispatched in its own task, so a handler that calls back into the host and
//! awaits the answer never stalls the reader.
//!
//! # States
//!
//! `Uninitialized → Connecting → AwaitingActivation ⇄ Active ⇄ Deactivated`,
//! and any state `→ Closed`. Registration is sent as soon as the channel
//! opens; every other module-initiated request waits in the outbound buffer
//! until the host triggers the activation hook.

pub mod outbound;
pub mod pending;
pub mod registry;
pub mod request_id;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::channel::unix::UnixSocketChannel;
use crate::channel::{Channel, ChannelReader, ChannelWriter};
use crate::config::ModuleConfig;
use crate::error::{ModuleError, Result};
use crate::protocol::{codec, LineDecoder, Message};
use crate::value::{Arguments, Value};

use outbound::OutboundGate;
use pending::{PendingRequests, ResponseHandle};
use registry::{FunctionRegistry, HookRegistry};
use request_id::RequestIdGenerator;

pub use registry::{function_handler, hook_listener, FunctionHandler, HookListener};

/// Lifecycle state of a [`JunoModule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    /// Constructed; no channel yet.
    Uninitialized,
    /// Opening the channel.
    Connecting,
    /// Registered; outbound requests are buffered until the host activates us.
    AwaitingActivation,
    /// Outbound requests go straight to the channel.
    Active,
    /// The host suspended us; outbound requests are buffered again.
    Deactivated,
    /// Connection gone; every operation fails with `ConnectionClosed`.
    Closed,
}

/// Identity a module announces to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    /// Module identifier, also the request id prefix.
    pub module_id: String,
    /// Module version.
    pub version: String,
    /// Required modules mapped to version requirements.
    pub dependencies: BTreeMap<String, String>,
}

impl ModuleDescriptor {
    /// Describe a module without dependencies.
    pub fn new(module_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            version: version.into(),
            dependencies: BTreeMap::new(),
        }
    }

    /// Add a dependency on `module` matching `requirement`.
    pub fn with_dependency(mut self, module: impl Into<String>, requirement: impl Into<String>) -> Self {
        self.dependencies.insert(module.into(), requirement.into());
        self
    }
}

/// A module's connection to a Juno host.
///
/// Cheap to clone; clones share one connection. The connection stays open
/// until [`JunoModule::close`] is called or the host goes away.
#[derive(Clone)]
pub struct JunoModule {
    inner: Arc<ModuleInner>,
}

impl std::fmt::Debug for JunoModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JunoModule")
            .field("module_id", &self.inner.descriptor.module_id)
            .field("state", &self.inner.outbound.state())
            .field("pending", &self.inner.pending.len())
            .finish_non_exhaustive()
    }
}

struct ModuleInner {
    descriptor: ModuleDescriptor,
    config: ModuleConfig,
    ids: RequestIdGenerator,
    pending: PendingRequests,
    functions: FunctionRegistry,
    hooks: HookRegistry,
    outbound: OutboundGate,
    shutdown: CancellationToken,
    /// Read and write loop handles, awaited by `close`.
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl JunoModule {
    /// Create a runtime with the default configuration.
    pub fn new(descriptor: ModuleDescriptor) -> Self {
        Self::with_config(descriptor, ModuleConfig::default())
    }

    /// Create a runtime with an explicit configuration.
    pub fn with_config(descriptor: ModuleDescriptor, config: ModuleConfig) -> Self {
        let ids = RequestIdGenerator::new(&descriptor.module_id);
        Self {
            inner: Arc::new(ModuleInner {
                descriptor,
                config,
                ids,
                pending: PendingRequests::new(),
                functions: FunctionRegistry::new(),
                hooks: HookRegistry::new(),
                outbound: OutboundGate::new(),
                shutdown: CancellationToken::new(),
                loops: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Module identifier.
    pub fn module_id(&self) -> &str {
        &self.inner.descriptor.module_id
    }

    /// Module version.
    pub fn version(&self) -> &str {
        &self.inner.descriptor.version
    }

    /// Active configuration.
    pub fn config(&self) -> &ModuleConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ModuleState {
        self.inner.outbound.state()
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Number of frames held back until activation.
    pub fn buffered_frames(&self) -> usize {
        self.inner.outbound.buffered()
    }

    /// Open `channel`, start the read and write loops and register with the
    /// host.
    ///
    /// Resolves once the host acknowledges the registration. The module is
    /// not active yet at that point; requests issued before the host sends
    /// the activation hook are buffered.
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` if called more than once, `Channel` if the channel
    /// cannot be opened, or whatever error the host answers the registration
    /// with. A rejected registration closes the connection, so the runtime
    /// ends up `Closed`.
    pub async fn initialize<C: Channel>(&self, mut channel: C) -> Result<Value> {
        let inner = &self.inner;
        inner.outbound.begin_connecting()?;

        let (reader, writer) = match channel.open().await {
            Ok(halves) => halves,
            Err(e) => {
                inner.outbound.abort_connecting();
                log::error!("[Juno] Failed to open channel: {e}");
                return Err(e.into());
            }
        };

        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        if !inner.outbound.attach(frame_tx) {
            return Err(ModuleError::ConnectionClosed);
        }

        let write_handle = tokio::spawn(write_loop(Arc::clone(inner), writer, frame_rx));
        let read_handle = tokio::spawn(read_loop(Arc::clone(inner), reader));
        inner
            .loops
            .lock()
            .expect("loop handles mutex poisoned")
            .extend([read_handle, write_handle]);

        log::info!(
            "[Juno] Connected, registering {} {}",
            inner.descriptor.module_id,
            inner.descriptor.version
        );

        let descriptor = &inner.descriptor;
        let handle = inner.request(
            |request_id| Message::RegisterModuleRequest {
                request_id,
                module_id: descriptor.module_id.clone(),
                version: descriptor.version.clone(),
                dependencies: descriptor.dependencies.clone(),
            },
            Delivery::Direct,
        )?;
        let registered = handle.await;
        if let Err(e) = &registered {
            log::error!("[Juno] Registration failed: {e}");
            inner.teardown("registration rejected");
        }
        registered
    }

    /// [`initialize`](Self::initialize) over the Unix socket at
    /// `config.socket_path`.
    pub async fn initialize_unix(&self) -> Result<Value> {
        let channel = UnixSocketChannel::new(&self.inner.config.socket_path)
            .with_read_buffer_size(self.inner.config.read_buffer_size);
        self.initialize(channel).await
    }

    /// Serve `name` with `handler` and declare it to the host.
    ///
    /// The handler is registered locally right away, replacing any earlier
    /// one; the returned handle resolves when the host acknowledges the
    /// declaration.
    pub fn declare_function<F, Fut>(&self, name: &str, handler: F) -> Result<ResponseHandle>
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.declare_function_handler(name, function_handler(handler))
    }

    /// [`declare_function`](Self::declare_function) with a prebuilt handler.
    pub fn declare_function_handler(&self, name: &str, handler: FunctionHandler) -> Result<ResponseHandle> {
        self.inner.ensure_connected()?;
        self.inner.functions.declare(name, handler);
        self.inner.request(
            |request_id| Message::DeclareFunctionRequest {
                request_id,
                function: name.to_string(),
            },
            Delivery::Gated,
        )
    }

    /// Call `function` (usually `"<module>.<name>"`) through the host.
    ///
    /// Resolves to the function's return value.
    pub fn call_function(&self, function: &str, arguments: Arguments) -> Result<ResponseHandle> {
        self.inner.request(
            |request_id| Message::FunctionCallRequest {
                request_id,
                function: function.to_string(),
                arguments,
            },
            Delivery::Gated,
        )
    }

    /// Listen to `hook` and subscribe to it on the host.
    ///
    /// Listeners for the same hook run in registration order.
    pub fn register_hook<F, Fut>(&self, hook: &str, listener: F) -> Result<ResponseHandle>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register_hook_listener(hook, hook_listener(listener))
    }

    /// [`register_hook`](Self::register_hook) with a prebuilt listener.
    pub fn register_hook_listener(&self, hook: &str, listener: HookListener) -> Result<ResponseHandle> {
        self.inner.ensure_connected()?;
        self.inner.hooks.register(hook, listener);
        self.inner.request(
            |request_id| Message::RegisterHookRequest {
                request_id,
                hook: hook.to_string(),
            },
            Delivery::Gated,
        )
    }

    /// Ask the host to trigger `hook` with `data` for every subscriber.
    pub fn trigger_hook(&self, hook: &str, data: impl Into<Value>) -> Result<ResponseHandle> {
        let data = data.into();
        self.inner.request(
            |request_id| Message::TriggerHookRequest {
                request_id,
                hook: hook.to_string(),
                data,
            },
            Delivery::Gated,
        )
    }

    /// Close the connection.
    ///
    /// Every pending request fails with `ConnectionClosed`. Waits for the
    /// read and write loops to stop.
    pub async fn close(&self) {
        self.inner.teardown("closed by module");
        let loops: Vec<JoinHandle<()>> = self
            .inner
            .loops
            .lock()
            .expect("loop handles mutex poisoned")
            .drain(..)
            .collect();
        for handle in loops {
            if let Err(e) = handle.await {
                log::error!("[Juno] Connection task failed: {e}");
            }
        }
    }
}

/// How an outbound frame passes the activation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// Buffered until the module is active.
    Gated,
    /// Written immediately.
    Direct,
}

impl ModuleInner {
    fn ensure_connected(&self) -> Result<()> {
        match self.outbound.state() {
            ModuleState::Uninitialized | ModuleState::Connecting => Err(ModuleError::NotInitialized),
            ModuleState::Closed => Err(ModuleError::ConnectionClosed),
            _ => Ok(()),
        }
    }

    /// Build a request with a fresh id, register its waiter and send it.
    fn request(&self, build: impl FnOnce(String) -> Message, delivery: Delivery) -> Result<ResponseHandle> {
        self.ensure_connected()?;
        let request_id = self.ids.next_id();
        let message = build(request_id.clone());
        let frame = codec::encode(&message)?;
        let handle = match &message {
            Message::FunctionCallRequest { function, .. } => self.pending.register_call(&request_id, function)?,
            _ => self.pending.register(&request_id)?,
        };

        let sent = match delivery {
            Delivery::Gated => self.outbound.send(frame),
            Delivery::Direct => self.outbound.send_direct(frame),
        };
        if let Err(e) = sent {
            self.pending.remove(&request_id);
            return Err(e);
        }
        Ok(handle)
    }

    /// Send a reply to a host-issued request. Replies skip the gate.
    fn reply(&self, message: &Message) {
        let sent = codec::encode(message)
            .map_err(ModuleError::from)
            .and_then(|frame| self.outbound.send_direct(frame));
        if let Err(e) = sent {
            log::warn!(
                "[Juno] Could not reply to {}: {e}",
                message.request_id().unwrap_or("?")
            );
        }
    }

    /// Move to `Closed` and fail every pending request. Idempotent.
    fn teardown(&self, reason: &str) {
        if self.outbound.close() {
            let failed = self.pending.fail_all(&ModuleError::ConnectionClosed);
            self.shutdown.cancel();
            log::info!("[Juno] Connection closed ({reason}), failed {failed} pending requests");
        }
    }

    async fn dispatch(&self, frame: Vec<u8>) {
        let message = codec::decode(&frame);
        log::debug!("[Juno] Received {:?} {}", message.kind(), message.request_id().unwrap_or(""));

        match message {
            Message::RegisterModuleResponse { request_id }
            | Message::RegisterHookResponse { request_id }
            | Message::TriggerHookResponse { request_id }
            | Message::DeclareFunctionResponse { request_id, .. } => {
                self.pending.resolve(&request_id, Value::Bool(true));
            }
            Message::FunctionCallResponse { request_id, data } => {
                self.pending.resolve(&request_id, data);
            }
            Message::Error { request_id, error } => {
                self.pending.fail(&request_id, error);
            }
            Message::FunctionCallRequest {
                request_id,
                function,
                arguments,
            } => self.serve_function_call(request_id, &function, arguments).await,
            Message::TriggerHookRequest {
                request_id,
                hook,
                data,
            } => self.serve_hook_trigger(request_id, &hook, &data).await,
            Message::RegisterModuleRequest { request_id, .. }
            | Message::RegisterHookRequest { request_id, .. }
            | Message::DeclareFunctionRequest { request_id, .. } => {
                log::error!("[Juno] Host sent a module-side request ({request_id}), dropping");
            }
            // Already logged by the codec.
            Message::Unknown => {}
        }
    }

    async fn serve_function_call(&self, request_id: String, function: &str, arguments: Arguments) {
        let name = self.local_function_name(function);
        let reply = match self.functions.invoke(name, arguments).await {
            Ok(data) => Message::FunctionCallResponse { request_id, data },
            Err(e) => {
                log::error!("[Juno] Call to '{function}' failed: {e}");
                Message::Error {
                    request_id,
                    error: e.to_code(),
                }
            }
        };
        self.reply(&reply);
    }

    /// Strip a leading `"<module_id>."` unless the full name is itself declared.
    fn local_function_name<'a>(&self, function: &'a str) -> &'a str {
        let local = function
            .strip_prefix(self.descriptor.module_id.as_str())
            .and_then(|rest| rest.strip_prefix('.'));
        match local {
            Some(local) if !self.functions.contains(function) => local,
            _ => function,
        }
    }

    async fn serve_hook_trigger(&self, request_id: String, hook: &str, data: &Value) {
        if hook == self.config.activation_hook {
            self.outbound.activate();
        } else if hook == self.config.deactivation_hook {
            self.outbound.deactivate();
        } else if let Err(e) = self.hooks.dispatch(hook, data).await {
            log::debug!("[Juno] Hook '{hook}' finished with error: {e}");
        }
        self.reply(&Message::TriggerHookResponse { request_id });
    }
}

/// Read loop: splits the byte stream into frames and dispatches each frame
/// in its own task.
async fn read_loop(inner: Arc<ModuleInner>, mut reader: Box<dyn ChannelReader>) {
    let mut decoder = LineDecoder::with_max_frame_size(inner.config.max_frame_size);
    let mut dispatches: JoinSet<()> = JoinSet::new();
    let shutdown = inner.shutdown.clone();

    let reason = loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => break "shutdown",

            Some(joined) = dispatches.join_next(), if !dispatches.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        log::error!("[Juno] Dispatch task panicked: {e}");
                    }
                }
            }

            received = reader.recv() => match received {
                Ok(Some(bytes)) => {
                    for frame in decoder.feed(&bytes) {
                        let inner = Arc::clone(&inner);
                        dispatches.spawn(async move { inner.dispatch(frame).await });
                    }
                }
                Ok(None) => break "host disconnected",
                Err(e) => {
                    log::error!("[Juno] Read error: {e}");
                    break "read error";
                }
            },
        }
    };

    if decoder.has_partial() {
        log::debug!("[Juno] Discarding partial frame at end of stream");
    }
    inner.teardown(reason);
}

/// Write loop: drains queued frames into the channel until the queue closes.
async fn write_loop(
    inner: Arc<ModuleInner>,
    mut writer: Box<dyn ChannelWriter>,
    mut frame_rx: UnboundedReceiver<Vec<u8>>,
) {
    while let Some(data) = frame_rx.recv().await {
        if let Err(e) = writer.send(&data).await {
            log::error!("[Juno] Write error: {e}");
            inner.teardown("write error");
            break;
        }
    }
    writer.close().await;
}
