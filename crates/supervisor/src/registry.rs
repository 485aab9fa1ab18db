//! Connection registry: one live session per server name.
//!
//! All state sits behind `parking_lot` mutexes that are never held across an
//! `.await`. Concurrent connects for the same name share a single spawned
//! attempt through a [`Shared`] future, so the attempt runs to completion even
//! when every caller gives up waiting.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use th_domain::config::McpTransportKind;
use th_mcp_client::McpToolDef;

use crate::connector::{McpConnector, McpSession};
use crate::error::{ConfigError, SupervisorError};
use crate::resolver::{is_filesystem_server, looks_like_path, ResolvedServerConfig};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Snapshot of a server's connection state, recomputed on every attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub tool_count: usize,
    pub tool_names: Vec<String>,
}

impl ServerStatus {
    fn failed(error: String, last_connected: Option<DateTime<Utc>>) -> Self {
        Self {
            connected: false,
            last_connected,
            last_error: Some(error),
            tool_count: 0,
            tool_names: Vec::new(),
        }
    }
}

struct ServerConnection {
    transport: McpTransportKind,
    session: Arc<dyn McpSession>,
    tools: Vec<McpToolDef>,
    character: Option<String>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<String, ServerConnection>,
    statuses: HashMap<String, ServerStatus>,
    /// character id -> server names. Empty sets are pruned.
    character_servers: HashMap<String, BTreeSet<String>>,
}

impl RegistryState {
    fn unlink(&mut self, name: &str) {
        self.character_servers.retain(|_, names| {
            names.remove(name);
            !names.is_empty()
        });
    }

    /// Associate `name` with `character`, dropping any previous owner. A
    /// server belongs to at most one character.
    fn link(&mut self, name: &str, character: Option<&str>) {
        self.unlink(name);
        if let Some(id) = character {
            self.character_servers
                .entry(id.to_string())
                .or_default()
                .insert(name.to_string());
        }
    }
}

type PendingConnect = Shared<BoxFuture<'static, ServerStatus>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ConnectionRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ConnectionRegistry {
    connector: Arc<dyn McpConnector>,
    settle_delay: Duration,
    state: Mutex<RegistryState>,
    in_flight: Mutex<HashMap<String, PendingConnect>>,
}

impl ConnectionRegistry {
    pub fn new(connector: Arc<dyn McpConnector>, settle_delay: Duration) -> Self {
        Self {
            connector,
            settle_delay,
            state: Mutex::new(RegistryState::default()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Connect `name` and discover its tools.
    ///
    /// Never fails: the outcome is reported through the returned status.
    /// While an attempt for `name` is in flight, further calls wait for that
    /// attempt instead of starting their own.
    pub async fn connect(
        self: &Arc<Self>,
        name: &str,
        config: ResolvedServerConfig,
        character: Option<&str>,
    ) -> ServerStatus {
        let pending = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(name) {
                Some(pending) => {
                    tracing::debug!(server = %name, "connect already in flight, joining");
                    pending.clone()
                }
                None => {
                    let this = Arc::clone(self);
                    let owned_name = name.to_string();
                    let character = character.map(str::to_string);
                    // The task takes the `in_flight` lock to remove itself, so
                    // it cannot finish before the entry below is inserted.
                    let handle = tokio::spawn(async move {
                        let status = this.connect_inner(&owned_name, config, character).await;
                        this.in_flight.lock().remove(&owned_name);
                        status
                    });
                    let pending = async move {
                        handle.await.unwrap_or_else(|e| {
                            ServerStatus::failed(format!("connect task failed: {e}"), None)
                        })
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(name.to_string(), pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    async fn connect_inner(
        &self,
        name: &str,
        config: ResolvedServerConfig,
        character: Option<String>,
    ) -> ServerStatus {
        let character = character.as_deref();

        let existing = {
            let state = self.state.lock();
            state.connections.get(name).map(|conn| {
                (
                    conn.character.as_deref() == character,
                    state.statuses.get(name).cloned(),
                )
            })
        };
        match existing {
            Some((true, Some(status))) => {
                tracing::debug!(server = %name, character = ?character, "already connected");
                return status;
            }
            Some(_) => {
                tracing::info!(server = %name, character = ?character, "reconnecting under a different character");
                self.disconnect(name).await;
                tokio::time::sleep(self.settle_delay).await;
            }
            None => {}
        }

        self.state.lock().link(name, character);

        if let Err(e) = validate_filesystem_args(name, &config) {
            return self.mark_failed(name, character, &e.into());
        }

        tracing::info!(server = %name, transport = %config.kind(), character = ?character, "connecting MCP server");

        let session = match self.connector.connect(name, &config).await {
            Ok(session) => session,
            Err(e) if e.is_not_found() => {
                let err = SupervisorError::ExecutableNotFound {
                    server: name.to_string(),
                    command: config.command().unwrap_or_default().to_string(),
                };
                return self.mark_failed(name, character, &err);
            }
            Err(e) => return self.mark_failed(name, character, &e.into()),
        };

        let tools = match session.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    tracing::debug!(server = %name, error = %close_err, "error closing session after failed discovery");
                }
                return self.mark_failed(name, character, &e.into());
            }
        };

        let status = ServerStatus {
            connected: true,
            last_connected: Some(Utc::now()),
            last_error: None,
            tool_count: tools.len(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
        };

        let replaced = {
            let mut state = self.state.lock();
            state.statuses.insert(name.to_string(), status.clone());
            state.link(name, character);
            state.connections.insert(
                name.to_string(),
                ServerConnection {
                    transport: config.kind(),
                    session,
                    tools,
                    character: character.map(str::to_string),
                },
            )
        };
        if let Some(old) = replaced {
            close_session(name, &old.session).await;
        }

        tracing::info!(server = %name, tool_count = status.tool_count, "MCP server connected");
        status
    }

    /// Record a failed attempt for `name` without touching any live session.
    ///
    /// The name stays associated with `character` so a later reload retries it.
    pub fn mark_failed(&self, name: &str, character: Option<&str>, error: &SupervisorError) -> ServerStatus {
        tracing::warn!(server = %name, character = ?character, error = %error, "MCP server connection failed");
        let mut state = self.state.lock();
        let last_connected = state.statuses.get(name).and_then(|s| s.last_connected);
        let status = ServerStatus::failed(error.to_string(), last_connected);
        state.statuses.insert(name.to_string(), status.clone());
        state.link(name, character);
        status
    }

    /// Close and forget `name`. Safe to call for unknown names.
    pub async fn disconnect(&self, name: &str) {
        let removed = {
            let mut state = self.state.lock();
            state.statuses.remove(name);
            state.unlink(name);
            state.connections.remove(name)
        };
        if let Some(conn) = removed {
            close_session(name, &conn.session).await;
            tracing::info!(server = %name, "MCP server disconnected");
        }
    }

    /// Disconnect every connected server missing from `configured`.
    /// Returns the names that were disconnected.
    pub async fn sync_with_config(&self, configured: &[String]) -> Vec<String> {
        let stale: Vec<String> = self
            .get_connected_servers()
            .into_iter()
            .filter(|name| !configured.contains(name))
            .collect();
        for name in &stale {
            self.disconnect(name).await;
        }
        if !stale.is_empty() {
            tracing::info!(disconnected = ?stale, "synced connections with config");
        }
        stale
    }

    pub async fn disconnect_all(&self) {
        let drained: Vec<(String, ServerConnection)> = {
            let mut state = self.state.lock();
            state.statuses.clear();
            state.character_servers.clear();
            state.connections.drain().collect()
        };
        let futs = drained.iter().map(|(name, conn)| close_session(name, &conn.session));
        futures_util::future::join_all(futs).await;
        tracing::info!(count = drained.len(), "all MCP servers disconnected");
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Every tool of every connected server as `(server, tool)`, ordered by
    /// server name.
    pub fn get_all_tools(&self) -> Vec<(String, McpToolDef)> {
        let state = self.state.lock();
        let mut names: Vec<&String> = state.connections.keys().collect();
        names.sort();
        names
            .into_iter()
            .flat_map(|name| {
                state.connections[name]
                    .tools
                    .iter()
                    .map(move |tool| (name.clone(), tool.clone()))
            })
            .collect()
    }

    pub fn get_server_tools(&self, name: &str) -> Vec<McpToolDef> {
        self.state
            .lock()
            .connections
            .get(name)
            .map(|c| c.tools.clone())
            .unwrap_or_default()
    }

    pub fn get_all_status(&self) -> BTreeMap<String, ServerStatus> {
        self.state
            .lock()
            .statuses
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn get_status(&self, name: &str) -> Option<ServerStatus> {
        self.state.lock().statuses.get(name).cloned()
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.state.lock().connections.contains_key(name)
    }

    pub fn get_connected_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().connections.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get_connected_character_id(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .connections
            .get(name)
            .and_then(|c| c.character.clone())
    }

    /// Server names associated with a character, connected or not.
    pub fn servers_for_character(&self, character: &str) -> Vec<String> {
        self.state
            .lock()
            .character_servers
            .get(character)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn transport_kind(&self, name: &str) -> Option<McpTransportKind> {
        self.state.lock().connections.get(name).map(|c| c.transport)
    }

    pub(crate) fn session(&self, name: &str) -> Option<Arc<dyn McpSession>> {
        self.state
            .lock()
            .connections
            .get(name)
            .map(|c| Arc::clone(&c.session))
    }
}

async fn close_session(name: &str, session: &Arc<dyn McpSession>) {
    if let Err(e) = session.close().await {
        tracing::warn!(server = %name, error = %e, "error closing MCP session");
    }
}

fn validate_filesystem_args(name: &str, config: &ResolvedServerConfig) -> Result<(), ConfigError> {
    if is_filesystem_server(name)
        && config.kind() == McpTransportKind::Stdio
        && !config.args().iter().any(|a| looks_like_path(a))
    {
        return Err(ConfigError::NoFilesystemPath {
            server: name.to_string(),
        });
    }
    Ok(())
}
