//! Tools domain module.
//!
//! This module handles all tool-related functionality: describing tools,
//! validating their input and holding them for dispatch.
//!
//! ## Architecture
//!
//! - `definitions/` - Built-in tool implementations (one file per tool)
//! - `builtin.rs` - Registers the built-in tools at startup
//! - `registry.rs` - Central tool registry keyed by name
//! - `schema.rs` - Input schema compilation and validation
//! - `handlers.rs` - The handler contract and result types
//! - `error.rs` - Tool-specific error types
//!
//! ## Adding a New Tool
//!
//! 1. Create a new file in `definitions/` (e.g., `my_tool.rs`)
//! 2. Define a params struct deriving `JsonSchema`, a `descriptor()` and a
//!    `ToolHandler` impl
//! 3. Export it in `definitions/mod.rs`
//! 4. Register it in `builtin.rs`

mod builtin;
pub mod definitions;
mod error;
mod handlers;
mod registry;
pub mod schema;

pub use builtin::register_builtin_tools;
pub use error::ToolError;
pub use handlers::*;
pub use registry::{RegisteredTool, ToolDescriptor, ToolRegistry};
pub use schema::{Schema, SchemaError, ValidationErrors, ValidationOptions};
