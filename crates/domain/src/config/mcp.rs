//! MCP (Model Context Protocol) server definitions.
//!
//! These are the *raw* server entries as written in the config file. They may
//! still contain placeholders (`${PRIMARY_FOLDER}`, `${HOME}`, ...); the
//! supervisor's resolver turns them into launchable configurations.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Global MCP configuration (`[mcp]`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    /// Server definitions keyed by server name.
    #[serde(default)]
    pub servers: BTreeMap<String, McpServerConfig>,
}

/// Per-character overrides (`[characters.<id>]`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CharacterConfig {
    /// Server definitions that apply only to this character. An entry with
    /// the same name as a global server replaces it.
    #[serde(default)]
    pub servers: BTreeMap<String, McpServerConfig>,
}

/// Configuration for a single MCP server.
///
/// The transport is not configured directly: a `command` implies stdio,
/// otherwise the declared `type` applies (SSE when omitted).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpServerConfig {
    /// The command to spawn (e.g. `"npx"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the spawned process.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Declared transport type, consulted only when `command` is absent.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub transport: Option<McpTransportKind>,

    /// Endpoint for the SSE transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// HTTP headers sent with every SSE request.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Disabled servers are kept in config but never connected.
    #[serde(default = "d_true")]
    pub enabled: bool,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            transport: None,
            url: None,
            headers: HashMap::new(),
            enabled: true,
        }
    }
}

impl McpServerConfig {
    /// The effective transport kind for this entry.
    pub fn transport_kind(&self) -> McpTransportKind {
        if self.command.is_some() {
            McpTransportKind::Stdio
        } else {
            self.transport.unwrap_or(McpTransportKind::Sse)
        }
    }
}

/// Transport kind for connecting to an MCP server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    Stdio,
    #[serde(alias = "http")]
    Sse,
}

impl std::fmt::Display for McpTransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => f.write_str("stdio"),
            Self::Sse => f.write_str("sse"),
        }
    }
}

fn d_true() -> bool {
    true
}
