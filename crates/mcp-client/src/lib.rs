//! `th-mcp-client`: MCP (Model Context Protocol) client for Toolhost.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for communicating with MCP servers.
//! - A stdio transport that spawns child processes and communicates over stdin/stdout.
//! - An SSE transport that talks to remote servers over HTTP.
//! - An `McpClient` that performs the handshake and exposes tool discovery
//!   and tool calls for a single server.
//!
//! Connection lifecycle across many servers lives in `th-supervisor`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use th_mcp_client::{McpClient, StdioTransport};
//!
//! let transport = StdioTransport::spawn("npx", &args, &env)?;
//! let client = McpClient::connect(Box::new(transport)).await?;
//!
//! for tool in client.list_tools().await? {
//!     println!("{}", tool.name);
//! }
//!
//! let result = client.call_tool("read_file", json!({"path": "/tmp/test.txt"})).await?;
//! ```

pub mod client;
pub mod protocol;
pub mod transport;

// Re-exports for convenience.
pub use client::{McpClient, McpError, INIT_TIMEOUT};
pub use protocol::{McpToolDef, ServerInfo, ToolCallContent, ToolCallResult};
pub use transport::{McpTransport, SseTransport, StdioTransport, TransportError};
