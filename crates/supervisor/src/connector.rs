//! The seam between the supervisor and the MCP client library.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use th_mcp_client::{McpClient, McpError, McpToolDef, SseTransport, StdioTransport, ToolCallResult};

use crate::resolver::{ResolvedServerConfig, ResolvedTransport};

/// A live session with one server.
#[async_trait]
pub trait McpSession: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<McpToolDef>, McpError>;

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<ToolCallResult, McpError>;

    async fn close(&self) -> Result<(), McpError>;
}

/// Opens sessions for resolved server configs.
#[async_trait]
pub trait McpConnector: Send + Sync {
    async fn connect(&self, name: &str, config: &ResolvedServerConfig) -> Result<Arc<dyn McpSession>, McpError>;
}

#[async_trait]
impl McpSession for McpClient {
    async fn list_tools(&self) -> Result<Vec<McpToolDef>, McpError> {
        McpClient::list_tools(self).await
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        McpClient::call_tool(self, tool, arguments).await
    }

    async fn close(&self) -> Result<(), McpError> {
        McpClient::close(self).await
    }
}

/// Connector backed by the stdio and SSE transports of `th-mcp-client`.
#[derive(Debug, Clone)]
pub struct DefaultConnector {
    sse_connect_timeout: Duration,
}

impl DefaultConnector {
    pub fn new(sse_connect_timeout: Duration) -> Self {
        Self { sse_connect_timeout }
    }
}

#[async_trait]
impl McpConnector for DefaultConnector {
    async fn connect(&self, name: &str, config: &ResolvedServerConfig) -> Result<Arc<dyn McpSession>, McpError> {
        let client = match &config.transport {
            ResolvedTransport::Stdio { command, args, env } => {
                tracing::debug!(server = %name, %command, ?args, "spawning stdio MCP server");
                let transport = StdioTransport::spawn(command, args, env)?;
                McpClient::connect(Box::new(transport)).await?
            }
            ResolvedTransport::Sse { url, headers } => {
                tracing::debug!(server = %name, %url, "opening SSE MCP stream");
                let transport = SseTransport::connect(url, headers, self.sse_connect_timeout).await?;
                McpClient::connect(Box::new(transport)).await?
            }
        };
        Ok(Arc::new(client))
    }
}
