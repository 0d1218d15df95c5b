//! Core module containing shared infrastructure components.
//!
//! This module provides the foundational building blocks for the tool server,
//! including error handling, configuration, the wire protocol, request
//! dispatch with its interceptor hooks, server lifecycle management and
//! transport layer abstractions.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod interceptor;
pub mod protocol;
pub mod server;
pub mod transport;

pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use interceptor::{CallLogInterceptor, ToolInterceptor};
pub use server::{CloseReason, ConnectionSummary, ToolServer};
pub use transport::{TransportConfig, TransportService};
