//! Transport layer for the tool server.
//!
//! This module provides different transport implementations:
//! - **STDIO**: Standard input/output, one session per process - feature: `stdio`
//! - **TCP**: Raw TCP socket, one session per connection - feature: `tcp`
//! - **HTTP**: One request per POST - feature: `http`
//!
//! Stream transports share the newline-delimited framing in [`framing`] and
//! hand each connection to [`ToolServer::serve`](crate::core::ToolServer::serve).
//!
//! # Feature Flags
//!
//! Transport implementations are conditionally compiled based on features:
//! - `stdio` (default): STDIO transport - minimal dependencies
//! - `tcp`: TCP transport - adds tokio/net
//! - `http`: HTTP transport - adds axum, tower-http

mod config;
mod error;
pub mod framing;
mod service;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "tcp")]
pub mod tcp;

#[cfg(feature = "stdio")]
pub mod stdio;

pub use config::TransportConfig;
pub use error::{TransportError, TransportResult};
pub use framing::{FrameError, FrameReader, FrameWriter};
pub use service::TransportService;

// Re-export configs for convenience
#[cfg(any(feature = "tcp", feature = "http"))]
pub use config::ListenConfig;

#[cfg(feature = "tcp")]
pub use config::TcpConfig;

#[cfg(feature = "http")]
pub use config::HttpConfig;
