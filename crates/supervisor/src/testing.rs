//! Hand-written fakes shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use th_mcp_client::{McpError, McpToolDef, ToolCallContent, ToolCallResult, TransportError};

use crate::connector::{McpConnector, McpSession};
use crate::resolver::{ResolvedServerConfig, ResolvedTransport};

pub(crate) fn stdio_config(name: &str) -> ResolvedServerConfig {
    ResolvedServerConfig {
        name: name.to_string(),
        transport: ResolvedTransport::Stdio {
            command: "fake-server".into(),
            args: vec!["--stdio".into()],
            env: HashMap::new(),
        },
    }
}

fn tool(name: &str) -> McpToolDef {
    McpToolDef {
        name: name.into(),
        description: format!("{name} tool"),
        input_schema: serde_json::json!({ "type": "object" }),
    }
}

pub(crate) struct FakeSession {
    closes: Arc<AtomicUsize>,
    hanging: Arc<HashSet<String>>,
}

#[async_trait]
impl McpSession for FakeSession {
    async fn list_tools(&self) -> Result<Vec<McpToolDef>, McpError> {
        Ok(vec![tool("read"), tool("write")])
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        if self.hanging.contains(tool) {
            std::future::pending::<()>().await;
        }
        Ok(ToolCallResult {
            content: vec![ToolCallContent {
                content_type: "text".into(),
                text: format!("{tool}:{arguments}"),
                data: None,
                mime_type: None,
            }],
            is_error: false,
        })
    }

    async fn close(&self) -> Result<(), McpError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector that counts attempts and fails for configured names.
pub(crate) struct FakeConnector {
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
    delay: Duration,
    failing: HashSet<String>,
    not_found: HashSet<String>,
    hanging: HashSet<String>,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self {
            connects: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            failing: HashSet::new(),
            not_found: HashSet::new(),
            hanging: HashSet::new(),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub(crate) fn not_found(mut self, name: &str) -> Self {
        self.not_found.insert(name.to_string());
        self
    }

    /// Calls to `tool` on sessions from this connector never complete.
    pub(crate) fn hanging_tool(mut self, tool: &str) -> Self {
        self.hanging.insert(tool.to_string());
        self
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl McpConnector for FakeConnector {
    async fn connect(&self, name: &str, _config: &ResolvedServerConfig) -> Result<Arc<dyn McpSession>, McpError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(name) {
            return Err(McpError::Protocol(format!("boom: {name}")));
        }
        if self.not_found.contains(name) {
            return Err(McpError::Transport(TransportError::Io(std::io::Error::from(
                std::io::ErrorKind::NotFound,
            ))));
        }
        Ok(Arc::new(FakeSession {
            closes: self.closes.clone(),
            hanging: Arc::new(self.hanging.clone()),
        }))
    }
}
