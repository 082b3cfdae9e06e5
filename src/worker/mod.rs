//! Worker runtime: handler registry and the executor pool.
//!
//! # Architecture
//!
//! A [`HandlerRegistry`] maps task kinds to [`TaskHandler`] implementations.
//! The registry is built during initialization (mutable), then frozen inside
//! an `Arc` when the [`WorkerPool`](pool::WorkerPool) starts -- no locks,
//! no post-start mutation.
//!
//! Handlers are opaque to the runtime: they may be blocking or
//! compute-bound, they may fail, and they may panic. None of that can take
//! an executor down; every handler outcome (return, error, panic, deadline
//! overrun) becomes a terminal task record published to the result store.

pub mod pool;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use pool::{WorkerOptions, WorkerPool};

/// A failure signaled by a task handler.
///
/// Carries the diagnostic string that ends up in the terminal record's
/// `error` field.
#[derive(Debug)]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Creates a handler failure with the given diagnostic.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// A handler for one task kind.
///
/// Receives the task's payload and produces either a result value or a
/// failure diagnostic. Handlers must be `Send + Sync`; one instance serves
/// all concurrent executions of its kind.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use conveyor::worker::{HandlerError, TaskHandler};
/// use serde_json::{json, Map, Value};
///
/// struct Square;
///
/// #[async_trait]
/// impl TaskHandler for Square {
///     async fn handle(&self, payload: &Map<String, Value>) -> Result<Value, HandlerError> {
///         let x = payload
///             .get("x")
///             .and_then(Value::as_i64)
///             .ok_or_else(|| HandlerError::new("payload field 'x' must be an integer"))?;
///         Ok(json!(x * x))
///     }
/// }
/// ```
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Executes one task with the given payload.
    async fn handle(&self, payload: &Map<String, Value>) -> Result<Value, HandlerError>;
}

/// Registry of handlers, keyed by task kind.
///
/// Built during initialization, then frozen inside an `Arc` for the pool's
/// lifetime. Registering a kind twice replaces the earlier handler
/// (last wins) and logs a warning.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler for a task kind. Last registration wins.
    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        let kind = kind.into();
        if self.handlers.insert(kind.clone(), handler).is_some() {
            tracing::warn!(kind = %kind, "replaced previously registered handler");
        }
    }

    /// Looks up the handler for a kind.
    pub fn get(&self, kind: &str) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(kind)
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
