//! The single invocation pipeline shared by every transport
//!
//! lookup → schema validation → capability check → rate limit → concurrency
//! slot → handler on its own task with timeout and cancellation.

use crate::mcp::broadcaster::Broadcaster;
use crate::registry::{ToolContext, ToolError, ToolRegistry};
use crate::routing::concurrency::{AcquireError, ConcurrencyLimiter};
use crate::routing::types::{FailureKind, InvocationRequest, InvocationResult};
use crate::security::rate_limiting::{PlanRateLimiter, RateLimitDecision};
use crate::shutdown::ShutdownCoordinator;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long a cancelled handler gets to observe its token before it is aborted
const CANCEL_GRACE: Duration = Duration::from_millis(250);

pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    rate_limiter: Arc<PlanRateLimiter>,
    concurrency: ConcurrencyLimiter,
    broadcaster: Arc<Broadcaster>,
    shutdown: Arc<ShutdownCoordinator>,
    default_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        rate_limiter: Arc<PlanRateLimiter>,
        concurrency: ConcurrencyLimiter,
        broadcaster: Arc<Broadcaster>,
        shutdown: Arc<ShutdownCoordinator>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            rate_limiter,
            concurrency,
            broadcaster,
            shutdown,
            default_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Run one invocation to completion.
    ///
    /// Results of SSE-originated requests are also pushed to the originating
    /// subscriber as a `tool_result` event.
    pub async fn invoke(&self, request: InvocationRequest) -> InvocationResult {
        let origin_client = request.origin_client.clone();
        let correlation_id = request.correlation_id.clone();
        let tool_name = request.tool_name.clone();
        let started = Instant::now();

        debug!(
            tool = %tool_name,
            transport = %request.transport,
            principal = %request.principal.id(),
            correlation_id = %correlation_id,
            "Dispatching tool invocation"
        );

        let result = self.execute(request).await;

        match &result {
            InvocationResult::Success { .. } => info!(
                tool = %tool_name,
                correlation_id = %correlation_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Tool invocation succeeded"
            ),
            InvocationResult::Failure { kind, message, .. } => info!(
                tool = %tool_name,
                correlation_id = %correlation_id,
                kind = %kind,
                message = %message,
                "Tool invocation failed"
            ),
        }

        if let Some(client_id) = origin_client {
            let payload = json!({
                "correlationId": correlation_id,
                "tool": tool_name,
                "result": result,
            });
            if !self.broadcaster.send_to(&client_id, "tool_result", &payload) {
                debug!(client_id = %client_id, "Originating subscriber is gone; result dropped");
            }
        }

        result
    }

    async fn execute(&self, request: InvocationRequest) -> InvocationResult {
        let tracked = match self.shutdown.track() {
            Some(guard) => guard,
            None => return InvocationResult::failure(FailureKind::Backpressure, "gateway is shutting down"),
        };

        let tool = match self.registry.get(&request.tool_name) {
            Some(tool) => tool,
            None => {
                return InvocationResult::failure(
                    FailureKind::NotFound,
                    format!("tool '{}' not found", request.tool_name),
                )
            }
        };

        if let Err(violation) = tool.validate_arguments(&request.arguments) {
            return InvocationResult::failure(FailureKind::InvalidArguments, violation);
        }

        let capability = tool.required_capability();
        if !request.principal.has_capability(capability) {
            return InvocationResult::failure(
                FailureKind::Forbidden,
                format!("tool '{}' requires the '{}' capability", tool.name(), capability),
            );
        }

        let principal_key = request.principal.rate_key();
        if let RateLimitDecision::RateLimited { retry_after_ms } =
            self.rate_limiter.check(&principal_key, request.principal.plan())
        {
            return InvocationResult::rate_limited(retry_after_ms);
        }

        let permit = match self.concurrency.acquire(&principal_key, &request.cancellation).await {
            Ok(permit) => permit,
            Err(AcquireError::Backpressure) => {
                return InvocationResult::failure(
                    FailureKind::Backpressure,
                    "too many concurrent invocations",
                )
            }
            Err(AcquireError::Cancelled) => {
                return InvocationResult::failure(FailureKind::InternalError, "invocation cancelled")
            }
        };

        let ctx = ToolContext {
            correlation_id: request.correlation_id.clone(),
            cancellation: request.cancellation.child_token(),
        };
        let handler_token = ctx.cancellation.clone();
        let handler = tool.handler();
        let principal = request.principal;
        let arguments = request.arguments;
        let timeout = tool.timeout().unwrap_or(self.default_timeout);

        // Slot and drain tracking live as long as the handler actually runs
        let mut task = tokio::spawn(async move {
            let _permit = permit;
            let _tracked = tracked;
            handler.call(arguments, &principal, &ctx).await
        });

        tokio::select! {
            biased;
            _ = handler_token.cancelled() => {
                debug!(tool = %tool.name(), "Invocation cancelled by its connection");
                if tokio::time::timeout(CANCEL_GRACE, &mut task).await.is_err() {
                    task.abort();
                }
                InvocationResult::failure(FailureKind::InternalError, "invocation cancelled")
            }
            joined = &mut task => match joined {
                Ok(Ok(data)) => InvocationResult::success(data),
                Ok(Err(ToolError::Failed(message))) => {
                    InvocationResult::failure(FailureKind::HandlerError, message)
                }
                Ok(Err(ToolError::Timeout(message))) => {
                    InvocationResult::failure(FailureKind::Timeout, message)
                }
                Err(e) => {
                    error!(tool = %tool.name(), "Tool handler task failed: {}", e);
                    InvocationResult::failure(FailureKind::InternalError, "internal error")
                }
            },
            _ = tokio::time::sleep(timeout) => {
                warn!(tool = %tool.name(), "Tool handler exceeded {:?}", timeout);
                handler_token.cancel();
                task.abort();
                InvocationResult::failure(
                    FailureKind::Timeout,
                    format!("tool '{}' timed out after {} ms", tool.name(), timeout.as_millis()),
                )
            }
        }
    }
}
