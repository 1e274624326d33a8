//! Local function handlers and hook listeners.
//!
//! The registries only hold closures. Notifying the host of a declaration or
//! hook subscription is the runtime's job.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::error::{ModuleError, Result};
use crate::value::{Arguments, Value};

/// Handler serving one declared function.
pub type FunctionHandler =
    Arc<dyn Fn(Arguments) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Listener invoked with a hook's payload.
pub type HookListener = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Box an async closure as a [`FunctionHandler`].
pub fn function_handler<F, Fut>(f: F) -> FunctionHandler
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |args| f(args).boxed())
}

/// Box an async closure as a [`HookListener`].
pub fn hook_listener<F, Fut>(f: F) -> HookListener
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |data| f(data).boxed())
}

/// Run a handler future, turning both errors and panics into
/// [`ModuleError::HandlerFailure`].
async fn guarded<T>(fut: BoxFuture<'static, anyhow::Result<T>>) -> Result<T> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ModuleError::HandlerFailure(format!("{e:#}"))),
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            Err(ModuleError::HandlerFailure(msg))
        }
    }
}

/// Declared functions, keyed by name.
#[derive(Default)]
pub struct FunctionRegistry {
    handlers: RwLock<HashMap<String, FunctionHandler>>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().expect("function registry lock poisoned");
        f.debug_struct("FunctionRegistry")
            .field("functions", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FunctionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous handler.
    pub fn declare(&self, name: &str, handler: FunctionHandler) {
        self.handlers
            .write()
            .expect("function registry lock poisoned")
            .insert(name.to_string(), handler);
    }

    /// Returns true if `name` has a handler.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers
            .read()
            .expect("function registry lock poisoned")
            .contains_key(name)
    }

    /// Invoke the handler for `name`.
    ///
    /// # Errors
    ///
    /// `UnknownFunction` if nothing is declared under `name`, or
    /// `HandlerFailure` if the handler returns an error or panics.
    pub async fn invoke(&self, name: &str, arguments: Arguments) -> Result<Value> {
        let handler = self
            .handlers
            .read()
            .expect("function registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| ModuleError::UnknownFunction(name.to_string()))?;
        guarded(handler(arguments)).await
    }
}

/// Hook listeners, keyed by hook name, in registration order.
#[derive(Default)]
pub struct HookRegistry {
    listeners: RwLock<HashMap<String, Vec<HookListener>>>,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read().expect("hook registry lock poisoned");
        f.debug_map()
            .entries(listeners.iter().map(|(hook, list)| (hook, list.len())))
            .finish()
    }
}

impl HookRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `listener` to the listeners of `hook`.
    pub fn register(&self, hook: &str, listener: HookListener) {
        self.listeners
            .write()
            .expect("hook registry lock poisoned")
            .entry(hook.to_string())
            .or_default()
            .push(listener);
    }

    /// Number of listeners registered for `hook`.
    pub fn listener_count(&self, hook: &str) -> usize {
        self.listeners
            .read()
            .expect("hook registry lock poisoned")
            .get(hook)
            .map_or(0, Vec::len)
    }

    /// Invoke every listener for `hook` in registration order, awaiting each
    /// before starting the next.
    ///
    /// A failing listener does not stop the ones after it.
    ///
    /// # Errors
    ///
    /// `HandlerFailure` carrying the first listener failure.
    pub async fn dispatch(&self, hook: &str, data: &Value) -> Result<()> {
        // Snapshot so listeners may register further hooks without deadlocking.
        let listeners = self
            .listeners
            .read()
            .expect("hook registry lock poisoned")
            .get(hook)
            .cloned()
            .unwrap_or_default();

        let mut first_error = None;
        for listener in listeners {
            if let Err(e) = guarded(listener(data.clone())).await {
                log::error!("[Juno] Listener for hook '{hook}' failed: {e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn args(pairs: &[(&str, i64)]) -> Arguments {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::Signed(*v)))
            .collect()
    }

    #[tokio::test]
    async fn test_invoke_declared_function() {
        let registry = FunctionRegistry::new();
        registry.declare(
            "add",
            function_handler(|args: Arguments| async move {
                let a = args.get("a").and_then(Value::as_i64).unwrap_or(0);
                let b = args.get("b").and_then(Value::as_i64).unwrap_or(0);
                Ok(Value::Signed(a + b))
            }),
        );
        assert!(registry.contains("add"));
        let result = registry.invoke("add", args(&[("a", 2), ("b", 3)])).await;
        assert_eq!(result, Ok(Value::Signed(5)));
    }

    #[tokio::test]
    async fn test_redeclare_overwrites() {
        let registry = FunctionRegistry::new();
        registry.declare("f", function_handler(|_| async { Ok(Value::Signed(1)) }));
        registry.declare("f", function_handler(|_| async { Ok(Value::Signed(2)) }));
        assert_eq!(registry.invoke("f", Arguments::new()).await, Ok(Value::Signed(2)));
    }

    #[tokio::test]
    async fn test_unknown_function() {
        let registry = FunctionRegistry::new();
        assert_eq!(
            registry.invoke("missing", Arguments::new()).await,
            Err(ModuleError::UnknownFunction("missing".into()))
        );
    }

    #[tokio::test]
    async fn test_handler_error_is_handler_failure() {
        let registry = FunctionRegistry::new();
        registry.declare(
            "fail",
            function_handler(|_| async { Err(anyhow::anyhow!("boom")) }),
        );
        assert_eq!(
            registry.invoke("fail", Arguments::new()).await,
            Err(ModuleError::HandlerFailure("boom".into()))
        );
    }

    #[tokio::test]
    async fn test_handler_panic_is_handler_failure() {
        let registry = FunctionRegistry::new();
        registry.declare(
            "panics",
            function_handler(|_| async {
                if true {
                    panic!("kaboom");
                }
                Ok(Value::Null)
            }),
        );
        assert_eq!(
            registry.invoke("panics", Arguments::new()).await,
            Err(ModuleError::HandlerFailure("kaboom".into()))
        );
    }

    #[tokio::test]
    async fn test_listeners_run_in_order() {
        let registry = HookRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let seen = Arc::clone(&seen);
            registry.register(
                "tick",
                hook_listener(move |data: Value| {
                    let seen = Arc::clone(&seen);
                    async move {
                        // Earlier listeners sleep longer; order must still hold.
                        tokio::time::sleep(std::time::Duration::from_millis(10 * (3 - n))).await;
                        seen.lock().unwrap().push((n, data));
                        Ok(())
                    }
                }),
            );
        }
        assert_eq!(registry.listener_count("tick"), 3);
        registry.dispatch("tick", &Value::from("payload")).await.unwrap();
        let seen = seen.lock().unwrap();
        let order: Vec<u64> = seen.iter().map(|(n, _)| *n).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(seen.iter().all(|(_, d)| d == &Value::from("payload")));
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_stop_later_ones() {
        let registry = HookRegistry::new();
        let ran = Arc::new(Mutex::new(false));
        registry.register("h", hook_listener(|_| async { Err(anyhow::anyhow!("first")) }));
        let flag = Arc::clone(&ran);
        registry.register(
            "h",
            hook_listener(move |_| {
                let flag = Arc::clone(&flag);
                async move {
                    *flag.lock().unwrap() = true;
                    Ok(())
                }
            }),
        );
        assert_eq!(
            registry.dispatch("h", &Value::Null).await,
            Err(ModuleError::HandlerFailure("first".into()))
        );
        assert!(*ran.lock().unwrap());
    }

    #[tokio::test]
    async fn test_dispatch_without_listeners_is_ok() {
        let registry = HookRegistry::new();
        assert_eq!(registry.dispatch("nobody", &Value::Null).await, Ok(()));
        assert_eq!(registry.listener_count("nobody"), 0);
    }
}
