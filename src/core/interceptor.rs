//! Hooks around tool calls.
//!
//! Interceptors see every call whose arguments passed validation.
//! `before_call` runs in registration order and may answer the call itself,
//! in which case the handler never runs. `after_call` runs in reverse order
//! with the final result, whoever produced it.
//!
//! A panicking interceptor is contained: in `before_call` the call completes
//! with a generic error result, in `after_call` the panic is logged.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::{error, info};

use crate::domains::tools::{ToolError, ToolResult};

/// A pre/post hook on tool execution.
#[async_trait]
pub trait ToolInterceptor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Return `Some` to answer the call without running the handler.
    async fn before_call(&self, _tool: &str, _arguments: &Value) -> Option<ToolResult> {
        None
    }

    async fn after_call(&self, _tool: &str, _result: &ToolResult) {}
}

/// Logs every tool call and its outcome at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallLogInterceptor;

#[async_trait]
impl ToolInterceptor for CallLogInterceptor {
    fn name(&self) -> &str {
        "call-log"
    }

    async fn before_call(&self, tool: &str, _arguments: &Value) -> Option<ToolResult> {
        info!("Calling tool '{}'", tool);
        None
    }

    async fn after_call(&self, tool: &str, result: &ToolResult) {
        info!(is_error = result.is_error, "Tool '{}' returned", tool);
    }
}

/// Ordered interceptor chain, shared by every connection.
#[derive(Default)]
pub struct InterceptorChain {
    interceptors: RwLock<Vec<Arc<dyn ToolInterceptor>>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor. Calls already past `before_call` are unaffected.
    pub fn add(&self, interceptor: Arc<dyn ToolInterceptor>) {
        info!("Added tool interceptor '{}'", interceptor.name());
        self.interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn ToolInterceptor>> {
        self.interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run `call` wrapped by every interceptor.
    pub async fn run<F, Fut>(&self, tool: &str, arguments: Value, call: F) -> ToolResult
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = ToolResult>,
    {
        let interceptors = self.snapshot();

        let mut answered = None;
        for interceptor in &interceptors {
            match contained(interceptor.before_call(tool, &arguments)).await {
                Ok(None) => {}
                Ok(Some(result)) => {
                    info!("Call to '{}' answered by interceptor '{}'", tool, interceptor.name());
                    answered = Some(result);
                    break;
                }
                Err(_) => {
                    error!("Interceptor '{}' panicked before '{}'", interceptor.name(), tool);
                    answered = Some(ToolResult::error_text(
                        ToolError::internal("interceptor panicked").public_message(),
                    ));
                    break;
                }
            }
        }

        let result = match answered {
            Some(result) => result,
            None => call(arguments).await,
        };

        for interceptor in interceptors.iter().rev() {
            if contained(interceptor.after_call(tool, &result)).await.is_err() {
                error!("Interceptor '{}' panicked after '{}'", interceptor.name(), tool);
            }
        }
        result
    }
}

fn contained<T>(future: impl Future<Output = T>) -> impl Future<Output = std::thread::Result<T>> {
    AssertUnwindSafe(future).catch_unwind()
}
