//! Tool Registry - central registration and lookup for all tools.
//!
//! This module provides:
//! - The [`ToolDescriptor`] advertised to clients
//! - A registry keyed by unique tool name, listed in registration order
//! - Copy-on-write snapshots so readers never observe a half-applied change

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::error::ToolError;
use super::handlers::ToolHandler;
use super::schema::Schema;

// ============================================================================
// Descriptor
// ============================================================================

/// Public description of a tool, as returned by `list_tools`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description.
    pub description: String,

    /// JSON Schema describing the accepted arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Create a new descriptor.
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A registered tool: descriptor, compiled schema and handler.
pub struct RegisteredTool {
    descriptor: ToolDescriptor,
    schema: Schema,
    handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.handler)
    }
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tool Registry
// ============================================================================

#[derive(Default, Clone)]
struct Snapshot {
    ordered: Vec<Arc<RegisteredTool>>,
    by_name: HashMap<String, Arc<RegisteredTool>>,
}

/// Tool registry - holds every tool the server exposes.
///
/// Reads clone an `Arc` to the current snapshot; writes build a new snapshot
/// and swap it in. Registration normally happens before dispatch starts, but
/// concurrent registration is safe.
#[derive(Default)]
pub struct ToolRegistry {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl ToolRegistry {
    /// Create an empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Arc<Snapshot> {
        let guard = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Register a tool.
    ///
    /// Fails with [`ToolError::DuplicateName`] if the name is taken and with
    /// [`ToolError::InvalidSchema`] if the input schema cannot be compiled.
    pub fn register<H>(&self, descriptor: ToolDescriptor, handler: H) -> Result<(), ToolError>
    where
        H: ToolHandler + 'static,
    {
        self.register_shared(descriptor, Arc::new(handler))
    }

    /// Register a tool whose handler is already shared.
    pub fn register_shared(
        &self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), ToolError> {
        if descriptor.name.trim().is_empty() {
            return Err(ToolError::invalid_descriptor("tool name must not be empty"));
        }

        let schema = Schema::from_value(&descriptor.input_schema)
            .map_err(|e| ToolError::invalid_schema(&descriptor.name, e))?;

        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        if guard.by_name.contains_key(&descriptor.name) {
            return Err(ToolError::duplicate_name(&descriptor.name));
        }

        let name = descriptor.name.clone();
        let tool = Arc::new(RegisteredTool {
            descriptor,
            schema,
            handler,
        });

        let mut next = Snapshot::clone(&guard);
        next.by_name.insert(name.clone(), Arc::clone(&tool));
        next.ordered.push(tool);
        *guard = Arc::new(next);

        info!("Registered tool: {}", name);
        Ok(())
    }

    /// Remove a tool, returning its descriptor.
    ///
    /// Requests that already resolved the tool keep their handle and finish.
    pub fn unregister(&self, name: &str) -> Option<ToolDescriptor> {
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        let removed = guard.by_name.get(name).cloned()?;

        let mut next = Snapshot::clone(&guard);
        next.by_name.remove(name);
        next.ordered.retain(|tool| tool.name() != name);
        *guard = Arc::new(next);

        info!("Unregistered tool: {}", name);
        Some(removed.descriptor.clone())
    }

    /// All descriptors, in registration order.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.current()
            .ordered
            .iter()
            .map(|tool| tool.descriptor.clone())
            .collect()
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<RegisteredTool>, ToolError> {
        match self.current().by_name.get(name) {
            Some(tool) => Ok(Arc::clone(tool)),
            None => {
                debug!("Tool lookup failed: {}", name);
                Err(ToolError::not_found(name))
            }
        }
    }

    /// Get all tool names, in registration order.
    pub fn tool_names(&self) -> Vec<String> {
        self.current()
            .ordered
            .iter()
            .map(|tool| tool.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.current().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
