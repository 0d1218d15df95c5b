//! Tool-specific error types.

use std::time::Duration;

use thiserror::Error;

use super::schema::SchemaError;

/// Errors that can occur during tool registration, resolution and execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The requested tool was not found.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// A tool with the same name is already registered.
    #[error("Tool already registered: {0}")]
    DuplicateName(String),

    /// The tool descriptor itself is unusable (e.g. empty name).
    #[error("Invalid tool descriptor: {0}")]
    InvalidDescriptor(String),

    /// The declared input schema could not be compiled.
    #[error("Invalid input schema for tool '{tool}': {source}")]
    InvalidSchema {
        tool: String,
        #[source]
        source: SchemaError,
    },

    /// Invalid arguments were provided to the tool.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool execution failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// The tool timed out during execution.
    #[error("Tool execution timed out after {0:?}")]
    Timeout(Duration),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Create a new "not found" error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create a new "duplicate name" error.
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName(name.into())
    }

    /// Create a new "invalid descriptor" error.
    pub fn invalid_descriptor(msg: impl Into<String>) -> Self {
        Self::InvalidDescriptor(msg.into())
    }

    /// Create a new "invalid schema" error.
    pub fn invalid_schema(tool: impl Into<String>, source: SchemaError) -> Self {
        Self::InvalidSchema {
            tool: tool.into(),
            source,
        }
    }

    /// Create a new "invalid arguments" error.
    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create a new "execution failed" error.
    pub fn execution_failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Create a new "internal" error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Message that is safe to hand back to a caller.
    ///
    /// Only argument problems are echoed verbatim; they describe the caller's
    /// own input. Everything else may carry internal detail and is replaced.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidArguments(msg) => format!("Invalid arguments: {}", msg),
            Self::NotFound(name) => format!("Unknown tool: {}", name),
            Self::Timeout(limit) => {
                format!("Tool execution timed out after {} ms", limit.as_millis())
            }
            _ => "Tool execution failed due to an internal error".to_string(),
        }
    }
}
