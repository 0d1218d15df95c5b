//! Built-in tool registration.
//!
//! Registers every tool under `definitions/` into a [`ToolRegistry`]. Adding a
//! new built-in tool means adding one line here.

use tracing::info;

use super::definitions::GetWeatherTool;
use super::{ToolError, ToolRegistry};

/// Register all built-in tools.
pub fn register_builtin_tools(registry: &ToolRegistry) -> Result<(), ToolError> {
    registry.register(GetWeatherTool::descriptor(), GetWeatherTool)?;

    info!("Registered {} built-in tool(s)", registry.len());
    Ok(())
}
