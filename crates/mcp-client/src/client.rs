//! A connected MCP client: handshake, tool discovery, and tool calls over
//! any [`McpTransport`].

use std::time::Duration;

use serde_json::Value;

use crate::protocol::{self, InitializeResult, McpToolDef, ServerInfo, ToolCallResult, ToolsListResult};
use crate::transport::{McpTransport, TransportError};

/// Upper bound for the `initialize` handshake.
pub const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on `tools/list` pages followed before giving up.
const MAX_TOOL_PAGES: usize = 100;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Errors specific to MCP operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    /// The server answered with a JSON-RPC error object.
    #[error("MCP server error {code}: {message}")]
    Server { code: i64, message: String },
}

impl McpError {
    /// True when the server's executable could not be spawned because it
    /// does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Transport(t) if t.is_not_found())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpClient
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An initialized session with one MCP server.
pub struct McpClient {
    transport: Box<dyn McpTransport>,
    server_info: ServerInfo,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("server_info", &self.server_info)
            .field("alive", &self.transport.is_alive())
            .finish()
    }
}

impl McpClient {
    /// Run the MCP handshake (`initialize` then `notifications/initialized`)
    /// over an already-open transport.
    ///
    /// On failure the transport is shut down and any server diagnostics are
    /// appended to the error.
    pub async fn connect(transport: Box<dyn McpTransport>) -> Result<Self, McpError> {
        let outcome = tokio::time::timeout(INIT_TIMEOUT, handshake(transport.as_ref())).await;
        match outcome {
            Ok(Ok(result)) => {
                let server_info = result.server_info;
                tracing::debug!(
                    server = %server_info.name,
                    protocol_version = %result.protocol_version,
                    "MCP handshake complete"
                );
                Ok(Self {
                    transport,
                    server_info,
                })
            }
            Ok(Err(e)) => Err(fail_connect(transport, e).await),
            Err(_) => Err(fail_connect(transport, McpError::Transport(TransportError::Timeout)).await),
        }
    }

    /// Identity the server reported during `initialize`.
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Check if the underlying transport is still alive.
    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    /// Discover every tool the server exposes, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDef>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let value = self.request("tools/list", params).await?;
            let page: ToolsListResult = serde_json::from_value(value)
                .map_err(|e| McpError::Protocol(format!("failed to parse tools/list result: {e}")))?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        tracing::warn!(pages = MAX_TOOL_PAGES, "tools/list pagination did not terminate");
        Ok(tools)
    }

    /// Call a tool on this server.
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments
        });
        let value = self.request("tools/call", Some(params)).await?;
        serde_json::from_value::<ToolCallResult>(value)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools/call result: {e}")))
    }

    /// Gracefully shut down the session.
    pub async fn close(&self) -> Result<(), McpError> {
        self.transport.shutdown().await.map_err(McpError::Transport)
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        if !self.transport.is_alive() {
            return Err(McpError::Transport(TransportError::Closed));
        }
        let resp = self.transport.send_request(method, params).await?;
        resp.into_result().map_err(|err| McpError::Server {
            code: err.code,
            message: err.message,
        })
    }
}

async fn handshake(transport: &dyn McpTransport) -> Result<InitializeResult, McpError> {
    let params = serde_json::to_value(protocol::initialize_params())
        .map_err(|e| McpError::Protocol(format!("failed to serialize initialize params: {e}")))?;

    let resp = transport.send_request("initialize", Some(params)).await?;
    let value = resp.into_result().map_err(|err| McpError::Server {
        code: err.code,
        message: format!("initialize failed: {}", err.message),
    })?;
    let result: InitializeResult = serde_json::from_value(value)
        .map_err(|e| McpError::Protocol(format!("failed to parse initialize result: {e}")))?;

    transport
        .send_notification("notifications/initialized", None)
        .await?;

    Ok(result)
}

async fn fail_connect(transport: Box<dyn McpTransport>, err: McpError) -> McpError {
    let diagnostics = transport.diagnostics();
    if let Err(e) = transport.shutdown().await {
        tracing::debug!(error = %e, "error shutting down transport after failed handshake");
    }
    match (err, diagnostics) {
        (McpError::Protocol(msg), Some(stderr)) => McpError::Protocol(format!("{msg}\nserver stderr:\n{stderr}")),
        (McpError::Server { code, message }, Some(stderr)) => McpError::Server {
            code,
            message: format!("{message}\nserver stderr:\n{stderr}"),
        },
        (err, Some(stderr)) => {
            tracing::warn!(stderr = %stderr, "MCP server failed during handshake");
            err
        }
        (err, None) => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{JsonRpcError, JsonRpcResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Transport that replays canned responses and records what was sent.
    struct ScriptedTransport {
        responses: parking_lot::Mutex<VecDeque<JsonRpcResponse>>,
        sent: std::sync::Arc<parking_lot::Mutex<Vec<(String, Option<Value>)>>>,
        alive: AtomicBool,
    }

    impl ScriptedTransport {
        fn new(results: Vec<Result<Value, JsonRpcError>>) -> Self {
            let responses = results
                .into_iter()
                .enumerate()
                .map(|(i, r)| {
                    let (result, error) = match r {
                        Ok(v) => (Some(v), None),
                        Err(e) => (None, Some(e)),
                    };
                    JsonRpcResponse {
                        jsonrpc: "2.0".into(),
                        id: i as u64 + 1,
                        result,
                        error,
                    }
                })
                .collect();
            Self {
                responses: parking_lot::Mutex::new(responses),
                sent: Default::default(),
                alive: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl McpTransport for ScriptedTransport {
        async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
            self.sent.lock().push((method.to_string(), params));
            self.responses.lock().pop_front().ok_or(TransportError::Closed)
        }

        async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
            self.sent.lock().push((method.to_string(), params));
            Ok(())
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn shutdown(&self) -> Result<(), TransportError> {
            self.alive.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    fn init_ok() -> Result<Value, JsonRpcError> {
        Ok(serde_json::json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "files", "version": "1.0.0" }
        }))
    }

    #[tokio::test]
    async fn handshake_sends_initialized_notification() {
        let transport = ScriptedTransport::new(vec![init_ok()]);
        let sent = transport.sent.clone();
        let client = McpClient::connect(Box::new(transport)).await.unwrap();

        assert_eq!(client.server_info().name, "files");
        let sent = sent.lock();
        assert_eq!(sent[0].0, "initialize");
        assert_eq!(sent[1].0, "notifications/initialized");
    }

    #[tokio::test]
    async fn initialize_error_is_reported_as_server_error() {
        let transport = ScriptedTransport::new(vec![Err(JsonRpcError {
            code: -32603,
            message: "boom".into(),
            data: None,
        })]);
        let err = McpClient::connect(Box::new(transport)).await.unwrap_err();
        match err {
            McpError::Server { code, message } => {
                assert_eq!(code, -32603);
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn list_tools_follows_cursor() {
        let transport = ScriptedTransport::new(vec![
            init_ok(),
            Ok(serde_json::json!({
                "tools": [{ "name": "read_file", "inputSchema": { "type": "object" } }],
                "nextCursor": "page-2"
            })),
            Ok(serde_json::json!({
                "tools": [{ "name": "write_file", "inputSchema": { "type": "object" } }]
            })),
        ]);
        let sent = transport.sent.clone();
        let client = McpClient::connect(Box::new(transport)).await.unwrap();

        let tools = client.list_tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["read_file", "write_file"]);

        let sent = sent.lock();
        assert_eq!(sent[3].1, Some(serde_json::json!({ "cursor": "page-2" })));
    }

    #[tokio::test]
    async fn call_tool_parses_result() {
        let transport = ScriptedTransport::new(vec![
            init_ok(),
            Ok(serde_json::json!({
                "content": [{ "type": "text", "text": "hello" }],
                "isError": false
            })),
        ]);
        let client = McpClient::connect(Box::new(transport)).await.unwrap();
        let result = client
            .call_tool("read_file", serde_json::json!({ "path": "/tmp/x" }))
            .await
            .unwrap();
        assert_eq!(result.text(), "hello");
    }

    #[tokio::test]
    async fn closed_client_rejects_requests() {
        let transport = ScriptedTransport::new(vec![init_ok()]);
        let client = McpClient::connect(Box::new(transport)).await.unwrap();
        client.close().await.unwrap();
        assert!(!client.is_alive());
        assert!(matches!(
            client.list_tools().await,
            Err(McpError::Transport(TransportError::Closed))
        ));
    }
}
