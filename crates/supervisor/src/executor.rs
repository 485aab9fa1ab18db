//! Tool execution against connected servers, bounded by a hard timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use th_mcp_client::ToolCallResult;
use tokio_util::sync::CancellationToken;

use crate::error::SupervisorError;
use crate::registry::ConnectionRegistry;

pub struct ToolExecutor {
    registry: Arc<ConnectionRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ConnectionRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Call `tool` on `server`. Fails immediately with `NotConnected` when no
    /// live session exists; never reconnects on its own.
    pub async fn execute_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, SupervisorError> {
        self.run(server, tool, arguments, None).await
    }

    /// Like [`execute_tool`](Self::execute_tool), additionally abandoning the
    /// call when `cancel` fires.
    pub async fn execute_tool_with_cancel(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<ToolCallResult, SupervisorError> {
        self.run(server, tool, arguments, Some(cancel)).await
    }

    async fn run(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
        cancel: Option<&CancellationToken>,
    ) -> Result<ToolCallResult, SupervisorError> {
        let session = self
            .registry
            .session(server)
            .ok_or_else(|| SupervisorError::NotConnected(server.to_string()))?;

        let start = Instant::now();
        tracing::debug!(server, tool, "executing MCP tool");

        let call = tokio::time::timeout(self.timeout, session.call_tool(tool, arguments));
        let outcome = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!(server, tool, "MCP tool call cancelled");
                    return Err(SupervisorError::Cancelled {
                        server: server.to_string(),
                        tool: tool.to_string(),
                    });
                }
                outcome = call => outcome,
            },
            None => call.await,
        };

        match outcome {
            Ok(result) => {
                let result = result?;
                tracing::debug!(
                    server,
                    tool,
                    is_error = result.is_error,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "MCP tool call finished"
                );
                Ok(result)
            }
            Err(_) => {
                tracing::warn!(server, tool, timeout_secs = self.timeout.as_secs(), "MCP tool call timed out");
                Err(SupervisorError::Timeout {
                    server: server.to_string(),
                    tool: tool.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }
}
