//! Tool Server Library
//!
//! This crate provides a small protocol server that exposes named tools to
//! remote callers. Callers list the available tools and invoke one by name
//! with JSON arguments; arguments are checked against the tool's declared
//! schema before the tool ever runs.
//!
//! # Architecture
//!
//! The server is organized into the following modules:
//!
//! - **core**: Core infrastructure including configuration, error handling,
//!   the wire protocol, request dispatch and its interceptors, the server
//!   and its transports
//! - **domains**: Business logic organized by bounded contexts
//!   - **tools**: Tool descriptors, schema validation, handlers and registry
//!
//! # Example
//!
//! ```rust,no_run
//! use mcp_tool_server::core::{Config, ToolServer};
//!
//! #[tokio::main]
//! async fn main() -> mcp_tool_server::Result<()> {
//!     let server = ToolServer::new(Config::from_env());
//!     server.register_builtin_tools()?;
//!     server.run().await
//! }
//! ```

pub mod core;
pub mod domains;

// Re-export commonly used types for convenience
pub use core::{Config, Error, Result, ToolServer};
