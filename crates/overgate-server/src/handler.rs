//! Handler registry.
//!
//! Named async handlers for the RPC ingress. Handlers are registered once at
//! startup and looked up by the logical method name carried in the call
//! metadata; unknown names fail with [`Error::HandlerNotFound`], which the
//! interceptor still records as a completed (erroring) call.

use overgate_core::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;
type BoxedHandler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Registry of named async RPC handlers.
///
/// # Example
///
/// ```
/// use overgate_server::HandlerRegistry;
/// use serde_json::json;
///
/// let mut handlers = HandlerRegistry::new();
/// handlers.register("echo", |args| async move { Ok(args) });
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let result = handlers.invoke("echo", json!({"x": 1})).await.unwrap();
/// assert_eq!(result, json!({"x": 1}));
/// # });
/// ```
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, BoxedHandler>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler under `name`, replacing any previous one.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.handlers
            .insert(name.into(), Arc::new(move |args| Box::pin(handler(args))));
    }

    /// Invokes the handler registered under `method`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandlerNotFound`] when no handler is registered,
    /// plus whatever the handler itself returns.
    pub async fn invoke(&self, method: &str, args: Value) -> Result<Value> {
        match self.handlers.get(method) {
            Some(handler) => handler(args).await,
            None => Err(Error::HandlerNotFound(method.to_string())),
        }
    }

    /// Whether a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
