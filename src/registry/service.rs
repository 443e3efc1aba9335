//! Tool registry
//!
//! Populated once at startup and read-only afterwards, so it is shared as a
//! plain `Arc<ToolRegistry>` with no locking on the read path.

use crate::error::{GatewayError, Result};
use crate::registry::types::{RegisteredTool, ToolDefinition, ToolDescriptor};
use jsonschema::JSONSchema;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Named, schema-validated tools in registration order
#[derive(Debug, Default)]
pub struct ToolRegistry {
    order: Vec<Arc<RegisteredTool>>,
    tools: HashMap<String, Arc<RegisteredTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; duplicate names and uncompilable schemas are errors
    pub fn register(&mut self, definition: ToolDefinition) -> Result<()> {
        let name = definition.name.trim().to_string();
        if name.is_empty() {
            return Err(GatewayError::registry("Tool name cannot be empty"));
        }
        if self.tools.contains_key(&name) {
            return Err(GatewayError::registry(format!(
                "Tool '{}' is already registered",
                name
            )));
        }

        let schema = JSONSchema::compile(&definition.input_schema).map_err(|e| {
            GatewayError::registry(format!("Invalid JSON Schema for tool '{}': {}", name, e))
        })?;

        debug!("Registered tool '{}'", name);
        let tool = Arc::new(RegisteredTool::new(definition, schema));
        self.order.push(tool.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<RegisteredTool>> {
        self.tools.get(name).cloned()
    }

    /// All tools in registration order
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.order.iter().map(|tool| tool.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Log the registered tool set
    pub fn log_summary(&self) {
        let names: Vec<&str> = self.order.iter().map(|tool| tool.name()).collect();
        info!("Tool registry ready with {} tools: {:?}", names.len(), names);
    }
}
