//! Core types for the tool registry

use crate::auth::{Capability, Principal};
use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Per-invocation context handed to a handler
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Correlation id of the originating request
    pub correlation_id: String,
    /// Fires when the caller goes away or the gateway force-closes
    pub cancellation: CancellationToken,
}

/// Failure reported by a handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// The handler ran and failed
    #[error("{0}")]
    Failed(String),
    /// An upstream call made by the handler timed out
    #[error("{0}")]
    Timeout(String),
}

impl ToolError {
    pub fn failed<S: Into<String>>(message: S) -> Self {
        ToolError::Failed(message.into())
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        ToolError::Timeout(message.into())
    }
}

/// The code behind a tool.
///
/// Handlers own every call to backing services. They receive already
/// validated arguments and the resolved principal, and should watch
/// `ctx.cancellation` during long waits.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(
        &self,
        arguments: Value,
        principal: &Principal,
        ctx: &ToolContext,
    ) -> std::result::Result<Value, ToolError>;
}

/// A tool as declared at startup
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub required_capability: Capability,
    /// Overrides the dispatcher's default handler timeout
    pub timeout: Option<Duration>,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema: serde_json::json!({ "type": "object" }),
            required_capability: Capability::Write,
            timeout: None,
            handler,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_schema(mut self, input_schema: Value) -> Self {
        self.input_schema = input_schema;
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.required_capability = capability;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("required_capability", &self.required_capability)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Public description of a tool, as listed to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub required_capability: Capability,
}

/// A registered tool with its compiled argument schema
pub struct RegisteredTool {
    definition: ToolDefinition,
    schema: JSONSchema,
}

impl RegisteredTool {
    pub(crate) fn new(definition: ToolDefinition, schema: JSONSchema) -> Self {
        Self { definition, schema }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn required_capability(&self) -> Capability {
        self.definition.required_capability
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.definition.timeout
    }

    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        self.definition.handler.clone()
    }

    /// Validate arguments; the error names the first violated constraint
    pub fn validate_arguments(&self, arguments: &Value) -> std::result::Result<(), String> {
        match self.schema.validate(arguments) {
            Ok(()) => Ok(()),
            Err(mut errors) => Err(match errors.next() {
                Some(error) => {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{}: {}", path, error)
                    }
                }
                None => "arguments do not match the tool schema".to_string(),
            }),
        }
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.definition.name.clone(),
            description: self.definition.description.clone(),
            input_schema: self.definition.input_schema.clone(),
            required_capability: self.definition.required_capability,
        }
    }
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}
