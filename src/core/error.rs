//! Error types and handling for the tool server.
//!
//! This module defines a unified error type for everything that can stop the
//! server from starting or keep it from running: tool registration and the
//! transport layer. Per-request failures never surface here; they are
//! answered on the wire instead.

use thiserror::Error;

/// A specialized Result type for tool server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the tool server.
#[derive(Debug, Error)]
pub enum Error {
    /// Error originating from the tools domain.
    #[error("Tool error: {0}")]
    Tool(#[from] crate::domains::tools::ToolError),

    /// Error originating from the transport layer.
    #[error("Transport error: {0}")]
    Transport(#[from] super::transport::TransportError),
}
