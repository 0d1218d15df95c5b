//! Tool handler contract and result types.
//!
//! A handler receives arguments that have already passed its tool's input
//! schema and produces a [`ToolResult`]. Two failure paths exist and must not
//! be confused:
//!
//! - a *business* failure is an ordinary `Ok(ToolResult)` with `is_error` set
//!   (e.g. "no forecast for that city");
//! - a *fault* is `Err(ToolError)` (or a panic). The dispatcher catches it and
//!   turns it into a sanitized `is_error` result.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ToolError;

/// A single typed content item in a tool result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Plain text.
    Text { text: String },
}

impl Content {
    /// Create a text content item.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The text body, if this is a text item.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
        }
    }
}

/// Output of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Ordered content items.
    pub content: Vec<Content>,

    /// True when the tool reports a business-level failure.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful result.
    pub fn success(content: Vec<Content>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Create a business-error result.
    pub fn error(content: Vec<Content>) -> Self {
        Self {
            content,
            is_error: true,
        }
    }

    /// Successful result with a single text item.
    pub fn text(text: impl Into<String>) -> Self {
        Self::success(vec![Content::text(text)])
    }

    /// Business-error result with a single text item.
    pub fn error_text(text: impl Into<String>) -> Self {
        Self::error(vec![Content::text(text)])
    }

    /// Text of the first content item, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(Content::as_text)
    }
}

/// Capability implemented by every tool.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with schema-validated arguments.
    async fn call(&self, arguments: Value) -> Result<ToolResult, ToolError>;
}

/// Adapter turning an async closure into a [`ToolHandler`].
pub struct FnHandler<F> {
    func: F,
}

/// Wrap an async closure as a tool handler.
///
/// ```rust
/// use mcp_tool_server::domains::tools::{handler_fn, ToolResult};
///
/// let handler = handler_fn(|args: serde_json::Value| async move {
///     Ok(ToolResult::text(format!("echo: {}", args)))
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(func: F) -> FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolResult, ToolError>> + Send + 'static,
{
    FnHandler { func }
}

#[async_trait::async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolResult, ToolError>> + Send + 'static,
{
    async fn call(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        (self.func)(arguments).await
    }
}
