//! Built-in tool handlers and registry assembly from configuration

use crate::auth::{Capability, Principal};
use crate::config::{HandlerConfig, ToolConfig};
use crate::error::Result;
use crate::registry::service::ToolRegistry;
use crate::registry::types::{ToolContext, ToolDefinition, ToolError, ToolHandler};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Returns its arguments unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

#[async_trait]
impl ToolHandler for EchoHandler {
    async fn call(
        &self,
        arguments: Value,
        _principal: &Principal,
        _ctx: &ToolContext,
    ) -> std::result::Result<Value, ToolError> {
        Ok(arguments)
    }
}

/// Forwards `{arguments, principal}` to an endpoint of the data service
#[derive(Debug, Clone)]
pub struct BackendHandler {
    client: reqwest::Client,
    endpoint: String,
}

impl BackendHandler {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn forward(&self, arguments: Value, principal: &Principal, ctx: &ToolContext) -> std::result::Result<Value, ToolError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-correlation-id", &ctx.correlation_id)
            .json(&json!({ "arguments": arguments, "principal": principal }))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::failed(format!("backend returned status {}", status.as_u16())));
        }

        response.json::<Value>().await.map_err(map_reqwest_error)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ToolError {
    if e.is_timeout() {
        ToolError::timeout("backend request timed out")
    } else if e.is_decode() {
        ToolError::failed("backend returned a malformed response")
    } else {
        ToolError::failed("backend request failed")
    }
}

#[async_trait]
impl ToolHandler for BackendHandler {
    async fn call(
        &self,
        arguments: Value,
        principal: &Principal,
        ctx: &ToolContext,
    ) -> std::result::Result<Value, ToolError> {
        debug!(endpoint = %self.endpoint, correlation_id = %ctx.correlation_id, "Forwarding tool call");
        tokio::select! {
            result = self.forward(arguments, principal, ctx) => result,
            _ = ctx.cancellation.cancelled() => Err(ToolError::failed("cancelled")),
        }
    }
}

/// The local echo tool registered when no tools are declared
pub fn default_echo_tool() -> ToolDefinition {
    ToolDefinition::new("echo", Arc::new(EchoHandler))
        .with_description("Returns the given message")
        .with_schema(json!({
            "type": "object",
            "properties": { "message": { "type": "string" } },
            "required": ["message"]
        }))
        .with_capability(Capability::Read)
}

/// Build a tool definition from its declaration
pub fn tool_from_config(tool: &ToolConfig, default_timeout: Duration) -> Result<ToolDefinition> {
    let timeout = tool.timeout_ms.map(Duration::from_millis);
    let handler: Arc<dyn ToolHandler> = match &tool.handler {
        HandlerConfig::Echo => Arc::new(EchoHandler),
        HandlerConfig::Backend { endpoint } => {
            Arc::new(BackendHandler::new(endpoint.clone(), timeout.unwrap_or(default_timeout))?)
        }
    };

    let mut definition = ToolDefinition::new(tool.name.clone(), handler)
        .with_description(tool.description.clone())
        .with_schema(tool.input_schema.clone())
        .with_capability(tool.capability);
    if let Some(timeout) = timeout {
        definition = definition.with_timeout(timeout);
    }
    Ok(definition)
}

/// Assemble the registry; any bad declaration aborts startup
pub fn build_registry(tools: &[ToolConfig], default_timeout: Duration) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    if tools.is_empty() {
        info!("No tools declared; registering the built-in echo tool");
        registry.register(default_echo_tool())?;
        return Ok(registry);
    }

    for tool in tools {
        registry.register(tool_from_config(tool, default_timeout)?)?;
    }
    Ok(registry)
}
