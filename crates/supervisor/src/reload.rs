//! Bulk reconnection of a character's servers after folder changes.
//!
//! A reload disconnects each of the character's servers, waits the settle
//! delay, re-resolves the server from the merged config, and reconnects it.
//! While a scheduled task is running the reload is deferred instead: exactly
//! one retry per character is kept, and a newer deferral replaces the older.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use th_domain::config::{McpServerConfig, SupervisorConfig};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::SupervisorError;
use crate::folders::FolderChangeEvent;
use crate::registry::{ConnectionRegistry, ServerStatus};
use crate::resolver::ConfigResolver;
use crate::source::{merge_layers, ServerConfigSource};
use crate::tasks::TaskActivity;

const EVENT_CAPACITY: usize = 256;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Events & status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-server progress attached to `mcp_reload_started` events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadProgress {
    pub server: String,
    pub completed_servers: usize,
    pub total_servers: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadEvent {
    #[serde(rename_all = "camelCase")]
    McpReloadStarted {
        character_id: String,
        total_servers: usize,
        estimated_duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<ReloadProgress>,
    },
    #[serde(rename_all = "camelCase")]
    McpReloadCompleted {
        character_id: String,
        total_servers: usize,
        duration_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    McpReloadFailed {
        character_id: String,
        failed_servers: Vec<String>,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadStatus {
    pub is_reloading: bool,
    /// 0-100.
    pub progress: u8,
    pub estimated_time_remaining_ms: u64,
    pub failed_servers: Vec<String>,
    pub total_servers: usize,
    pub completed_servers: usize,
}

impl Default for ReloadStatus {
    fn default() -> Self {
        Self {
            is_reloading: false,
            progress: 100,
            estimated_time_remaining_ms: 0,
            failed_servers: Vec::new(),
            total_servers: 0,
            completed_servers: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// A scheduled task was running; a retry is pending.
    Deferred,
    Completed { total: usize, failed: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Names that were disconnected.
    Applied(Vec<String>),
    Deferred,
}

struct ReloadState {
    is_reloading: bool,
    started_at: Instant,
    total_servers: usize,
    completed_servers: usize,
    failed_servers: Vec<String>,
}

struct PendingOp {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct PendingOps {
    reconnects: HashMap<String, PendingOp>,
    sync: Option<PendingOp>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ReloadCoordinator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ReloadCoordinator {
    registry: Arc<ConnectionRegistry>,
    resolver: Arc<ConfigResolver>,
    configs: Arc<dyn ServerConfigSource>,
    tasks: Arc<dyn TaskActivity>,
    settle_delay: Duration,
    defer_window: Duration,
    estimate_per_server: Duration,
    states: Mutex<HashMap<String, ReloadState>>,
    pending: Mutex<PendingOps>,
    next_generation: AtomicU64,
    events: broadcast::Sender<ReloadEvent>,
}

impl ReloadCoordinator {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        resolver: Arc<ConfigResolver>,
        configs: Arc<dyn ServerConfigSource>,
        tasks: Arc<dyn TaskActivity>,
        timings: &SupervisorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry,
            resolver,
            configs,
            tasks,
            settle_delay: timings.settle_delay(),
            defer_window: timings.defer_window(),
            estimate_per_server: timings.reload_estimate_per_server(),
            states: Mutex::new(HashMap::new()),
            pending: Mutex::new(PendingOps::default()),
            next_generation: AtomicU64::new(1),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.events.subscribe()
    }

    /// Consume folder-change events until the channel closes.
    pub fn spawn_listener(self: &Arc<Self>, mut rx: broadcast::Receiver<FolderChangeEvent>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        this.handle_folder_change(event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "folder change listener lagged, continuing");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("folder change listener stopped");
        })
    }

    pub async fn handle_folder_change(self: &Arc<Self>, event: FolderChangeEvent) -> ReloadOutcome {
        tracing::info!(character = %event.character, kind = ?event.kind, "synced folders changed, reloading MCP servers");
        self.reconnect_character(&event.character).await
    }

    /// Connect every enabled server configured for `character` (global
    /// servers only when `None`). Resolve failures are recorded as failed
    /// statuses; nothing here returns an error.
    pub async fn connect_configured(&self, character: Option<&str>) -> Vec<(String, ServerStatus)> {
        let merged = merge_layers(&self.configs.layers(character));
        let env = self.configs.env_vars();

        let attempts = merged.iter().filter(|(_, raw)| raw.enabled).map(|(name, raw)| {
            let env = &env;
            async move {
                let status = match self.resolver.resolve(name, raw, env, character) {
                    Ok(resolved) => self.registry.connect(name, resolved, character).await,
                    Err(e) => self.registry.mark_failed(name, character, &e.into()),
                };
                (name.clone(), status)
            }
        });
        futures_util::future::join_all(attempts).await
    }

    /// Reload every server associated with `character`, or defer when a
    /// scheduled task is running.
    pub async fn reconnect_character(self: &Arc<Self>, character: &str) -> ReloadOutcome {
        if self.tasks.has_running_tasks(Some(character)) {
            tracing::info!(
                character,
                retry_in_ms = self.defer_window.as_millis() as u64,
                "scheduled task running, deferring MCP reload"
            );
            self.schedule_reconnect(character);
            return ReloadOutcome::Deferred;
        }

        let servers = self.registry.servers_for_character(character);
        let total = servers.len();
        self.states.lock().insert(
            character.to_string(),
            ReloadState {
                is_reloading: true,
                started_at: Instant::now(),
                total_servers: total,
                completed_servers: 0,
                failed_servers: Vec::new(),
            },
        );
        self.emit(ReloadEvent::McpReloadStarted {
            character_id: character.to_string(),
            total_servers: total,
            estimated_duration_ms: duration_ms(self.estimate_per_server * total as u32),
            progress: None,
        });
        tracing::info!(character, total, "MCP reload started");

        let merged = merge_layers(&self.configs.layers(Some(character)));
        let env = self.configs.env_vars();
        let mut errors = Vec::new();

        for name in &servers {
            let result = self.reload_server(name, character, &merged, &env).await;
            let completed = {
                let mut states = self.states.lock();
                match states.get_mut(character) {
                    Some(state) => {
                        state.completed_servers += 1;
                        if result.is_err() {
                            state.failed_servers.push(name.clone());
                        }
                        state.completed_servers
                    }
                    None => 0,
                }
            };
            if let Err(e) = &result {
                errors.push(format!("{name}: {e}"));
            }
            self.emit(ReloadEvent::McpReloadStarted {
                character_id: character.to_string(),
                total_servers: total,
                estimated_duration_ms: duration_ms(self.estimate_per_server * total as u32),
                progress: Some(ReloadProgress {
                    server: name.clone(),
                    completed_servers: completed,
                    total_servers: total,
                    success: result.is_ok(),
                    error: result.err(),
                }),
            });
        }

        let (failed, elapsed) = {
            let mut states = self.states.lock();
            match states.get_mut(character) {
                Some(state) => {
                    state.is_reloading = false;
                    (state.failed_servers.clone(), state.started_at.elapsed())
                }
                None => (Vec::new(), Duration::ZERO),
            }
        };

        if failed.is_empty() {
            tracing::info!(character, total, elapsed_ms = duration_ms(elapsed), "MCP reload completed");
            self.emit(ReloadEvent::McpReloadCompleted {
                character_id: character.to_string(),
                total_servers: total,
                duration_ms: duration_ms(elapsed),
            });
        } else {
            tracing::warn!(character, ?failed, "MCP reload finished with failures");
            self.emit(ReloadEvent::McpReloadFailed {
                character_id: character.to_string(),
                failed_servers: failed.clone(),
                error: errors.join("; "),
            });
        }

        ReloadOutcome::Completed { total, failed }
    }

    async fn reload_server(
        &self,
        name: &str,
        character: &str,
        merged: &[(String, McpServerConfig)],
        env: &HashMap<String, String>,
    ) -> Result<(), String> {
        self.registry.disconnect(name).await;
        tokio::time::sleep(self.settle_delay).await;

        let Some((_, raw)) = merged.iter().find(|(n, _)| n == name) else {
            tracing::info!(server = %name, character, "server no longer configured, not reconnecting");
            return Ok(());
        };
        if !raw.enabled {
            tracing::info!(server = %name, character, "server disabled, not reconnecting");
            return Ok(());
        }

        let resolved = match self.resolver.resolve(name, raw, env, Some(character)) {
            Ok(resolved) => resolved,
            Err(e) => {
                let err = SupervisorError::from(e);
                self.registry.mark_failed(name, Some(character), &err);
                return Err(err.to_string());
            }
        };

        let status = self.registry.connect(name, resolved, Some(character)).await;
        if status.connected {
            Ok(())
        } else {
            Err(status.last_error.unwrap_or_else(|| "connect failed".into()))
        }
    }

    /// Disconnect servers missing from `configured`, or defer while any
    /// scheduled task is running.
    pub async fn sync_with_config_safely(self: &Arc<Self>, configured: Vec<String>) -> SyncOutcome {
        if self.tasks.has_running_tasks(None) {
            tracing::info!(
                retry_in_ms = self.defer_window.as_millis() as u64,
                "scheduled task running, deferring MCP config sync"
            );
            self.schedule_sync(configured);
            return SyncOutcome::Deferred;
        }
        SyncOutcome::Applied(self.registry.sync_with_config(&configured).await)
    }

    // ── Deferral ────────────────────────────────────────────────────

    fn schedule_reconnect(self: &Arc<Self>, character: &str) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut pending = self.pending.lock();

        let this = Arc::clone(self);
        let id = character.to_string();
        let window = self.defer_window;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            this.clear_pending_reconnect(&id, generation);
            this.reconnect_character(&id).await;
        });

        if let Some(previous) = pending
            .reconnects
            .insert(character.to_string(), PendingOp { generation, handle })
        {
            previous.handle.abort();
            tracing::debug!(character, "replaced pending MCP reload");
        }
    }

    fn schedule_sync(self: &Arc<Self>, configured: Vec<String>) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut pending = self.pending.lock();

        let this = Arc::clone(self);
        let window = self.defer_window;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            this.clear_pending_sync(generation);
            this.sync_with_config_safely(configured).await;
        });

        if let Some(previous) = pending.sync.replace(PendingOp { generation, handle }) {
            previous.handle.abort();
            tracing::debug!("replaced pending MCP config sync");
        }
    }

    /// A firing task removes its own entry before doing work, so a deferral
    /// scheduled during that work is not aborted by it.
    fn clear_pending_reconnect(&self, character: &str, generation: u64) {
        let mut pending = self.pending.lock();
        if pending.reconnects.get(character).map(|op| op.generation) == Some(generation) {
            pending.reconnects.remove(character);
        }
    }

    fn clear_pending_sync(&self, generation: u64) {
        let mut pending = self.pending.lock();
        if pending.sync.as_ref().map(|op| op.generation) == Some(generation) {
            pending.sync = None;
        }
    }

    pub fn has_pending_reconnect(&self, character: &str) -> bool {
        self.pending.lock().reconnects.contains_key(character)
    }

    pub fn has_pending_sync(&self) -> bool {
        self.pending.lock().sync.is_some()
    }

    /// Abort every deferred operation.
    pub fn cancel_pending(&self) {
        let mut pending = self.pending.lock();
        for (_, op) in pending.reconnects.drain() {
            op.handle.abort();
        }
        if let Some(op) = pending.sync.take() {
            op.handle.abort();
        }
    }

    // ── Status ──────────────────────────────────────────────────────

    pub fn get_reload_status(&self, character: &str) -> ReloadStatus {
        let states = self.states.lock();
        let Some(state) = states.get(character) else {
            return ReloadStatus::default();
        };

        if !state.is_reloading {
            return ReloadStatus {
                failed_servers: state.failed_servers.clone(),
                total_servers: state.total_servers,
                completed_servers: state.completed_servers,
                ..ReloadStatus::default()
            };
        }

        let progress = if state.total_servers == 0 {
            100
        } else {
            (state.completed_servers * 100 / state.total_servers).min(100) as u8
        };
        let remaining = state.total_servers.saturating_sub(state.completed_servers) as u32;
        let per_server = if state.completed_servers > 0 {
            state.started_at.elapsed() / state.completed_servers as u32
        } else {
            self.estimate_per_server
        };

        ReloadStatus {
            is_reloading: true,
            progress,
            estimated_time_remaining_ms: duration_ms(per_server * remaining),
            failed_servers: state.failed_servers.clone(),
            total_servers: state.total_servers,
            completed_servers: state.completed_servers,
        }
    }

    pub fn is_any_reloading(&self) -> bool {
        self.states.lock().values().any(|s| s.is_reloading)
    }

    fn emit(&self, event: ReloadEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn duration_ms(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folders::SyncFolderBook;
    use crate::sandbox::PathSandbox;
    use crate::source::StaticConfigSource;
    use crate::tasks::TaskBoard;
    use crate::testing::{stdio_config, FakeConnector};
    use std::collections::BTreeMap;
    use th_domain::config::CharacterConfig;

    struct Harness {
        connector: Arc<FakeConnector>,
        registry: Arc<ConnectionRegistry>,
        tasks: Arc<TaskBoard>,
        folders: Arc<SyncFolderBook>,
        coordinator: Arc<ReloadCoordinator>,
    }

    fn raw(command: &str) -> McpServerConfig {
        McpServerConfig {
            command: Some(command.into()),
            ..Default::default()
        }
    }

    async fn harness(connector: FakeConnector, names: &[&str]) -> Harness {
        let connector = Arc::new(connector);
        let registry = Arc::new(ConnectionRegistry::new(connector.clone(), Duration::from_millis(500)));
        let folders = Arc::new(SyncFolderBook::new());
        let resolver = Arc::new(ConfigResolver::new(folders.clone(), PathSandbox::default()));

        let servers: BTreeMap<String, McpServerConfig> =
            names.iter().map(|n| (n.to_string(), raw("fake-server"))).collect();
        let mut characters = BTreeMap::new();
        characters.insert("alice".to_string(), CharacterConfig { servers });
        let configs = Arc::new(StaticConfigSource::new(BTreeMap::new(), characters, HashMap::new()));

        let tasks = Arc::new(TaskBoard::new());
        let coordinator = Arc::new(ReloadCoordinator::new(
            registry.clone(),
            resolver,
            configs,
            tasks.clone(),
            &SupervisorConfig::default(),
        ));

        for name in names {
            registry.connect(name, stdio_config(name), Some("alice")).await;
        }

        Harness {
            connector,
            registry,
            tasks,
            folders,
            coordinator,
        }
    }

    fn drain(rx: &mut broadcast::Receiver<ReloadEvent>) -> Vec<ReloadEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn reload_reconnects_every_server() {
        let h = harness(FakeConnector::new(), &["one", "two"]).await;
        let mut rx = h.coordinator.subscribe();

        let outcome = h.coordinator.reconnect_character("alice").await;

        assert_eq!(outcome, ReloadOutcome::Completed { total: 2, failed: vec![] });
        assert_eq!(h.connector.connect_count(), 4);
        assert_eq!(h.connector.close_count(), 2);
        assert!(h.registry.is_connected("one") && h.registry.is_connected("two"));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        assert!(matches!(events.last(), Some(ReloadEvent::McpReloadCompleted { total_servers: 2, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn running_task_defers_and_newer_deferral_replaces_older() {
        let h = harness(FakeConnector::new(), &["one", "two", "three"]).await;
        let task = h.tasks.start(Some("alice"), "digest");
        let before = h.connector.connect_count();

        assert_eq!(h.coordinator.reconnect_character("alice").await, ReloadOutcome::Deferred);
        assert!(h.coordinator.has_pending_reconnect("alice"));
        assert_eq!(h.connector.connect_count(), before);
        assert_eq!(h.connector.close_count(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.coordinator.reconnect_character("alice").await, ReloadOutcome::Deferred);

        // Past the first deferral's fire time: it was replaced, nothing ran.
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(h.connector.connect_count(), before);
        assert!(h.coordinator.has_pending_reconnect("alice"));

        // The replacement fires 60s after the second trigger.
        h.tasks.finish(&task);
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(h.connector.connect_count(), before + 3);
        assert!(!h.coordinator.has_pending_reconnect("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn status_while_reloading_estimates_remaining_time() {
        let h = harness(FakeConnector::new().with_delay(Duration::from_secs(1)), &["one", "two", "three"]).await;
        assert_eq!(h.coordinator.get_reload_status("alice"), ReloadStatus::default());

        let coordinator = h.coordinator.clone();
        let reload = tokio::spawn(async move { coordinator.reconnect_character("alice").await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(h.coordinator.is_any_reloading());
        let status = h.coordinator.get_reload_status("alice");
        assert!(status.is_reloading);
        assert_eq!(status.progress, 0);
        assert_eq!(status.total_servers, 3);
        assert_eq!(status.estimated_time_remaining_ms, 9_000);

        reload.await.unwrap();
        let status = h.coordinator.get_reload_status("alice");
        assert!(!status.is_reloading);
        assert_eq!(status.progress, 100);
        assert_eq!(status.completed_servers, 3);
        assert_eq!(status.estimated_time_remaining_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sync_safely_defers_while_any_task_runs() {
        let h = harness(FakeConnector::new(), &["one", "two"]).await;
        let task = h.tasks.start(Some("bob"), "report");

        let outcome = h.coordinator.sync_with_config_safely(vec!["one".into()]).await;
        assert_eq!(outcome, SyncOutcome::Deferred);
        assert!(h.coordinator.has_pending_sync());
        assert!(h.registry.is_connected("two"));

        h.tasks.finish(&task);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!h.coordinator.has_pending_sync());
        assert!(!h.registry.is_connected("two"));

        let outcome = h.coordinator.sync_with_config_safely(vec![]).await;
        assert_eq!(outcome, SyncOutcome::Applied(vec!["one".to_string()]));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_pending_aborts_deferrals() {
        let h = harness(FakeConnector::new(), &["one"]).await;
        h.tasks.start(None, "backup");
        let before = h.connector.connect_count();

        h.coordinator.reconnect_character("alice").await;
        h.coordinator.sync_with_config_safely(vec![]).await;
        h.coordinator.cancel_pending();

        assert!(!h.coordinator.has_pending_reconnect("alice"));
        assert!(!h.coordinator.has_pending_sync());
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.connector.connect_count(), before);
        assert!(h.registry.is_connected("one"));
    }

    #[tokio::test(start_paused = true)]
    async fn folder_events_trigger_reload() {
        let h = harness(FakeConnector::new(), &["one"]).await;
        let mut rx = h.coordinator.subscribe();
        let listener = h.coordinator.spawn_listener(h.folders.subscribe());

        h.folders.add("alice", "/data/alice", true);

        loop {
            match rx.recv().await.unwrap() {
                ReloadEvent::McpReloadCompleted { character_id, .. } => {
                    assert_eq!(character_id, "alice");
                    break;
                }
                ReloadEvent::McpReloadFailed { error, .. } => panic!("reload failed: {error}"),
                _ => continue,
            }
        }
        assert_eq!(h.connector.connect_count(), 2);
        listener.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn connect_configured_connects_enabled_servers() {
        let h = harness(FakeConnector::new().failing("two"), &[]).await;
        let configs = Arc::new(StaticConfigSource::new(
            BTreeMap::from([
                ("one".to_string(), raw("fake-server")),
                ("two".to_string(), raw("fake-server")),
                (
                    "off".to_string(),
                    McpServerConfig {
                        enabled: false,
                        ..raw("fake-server")
                    },
                ),
                ("nourl".to_string(), McpServerConfig::default()),
            ]),
            BTreeMap::new(),
            HashMap::new(),
        ));
        let resolver = Arc::new(ConfigResolver::new(h.folders.clone(), PathSandbox::default()));
        let coordinator = ReloadCoordinator::new(
            h.registry.clone(),
            resolver,
            configs,
            h.tasks.clone(),
            &SupervisorConfig::default(),
        );

        let results: BTreeMap<_, _> = coordinator.connect_configured(None).await.into_iter().collect();

        assert_eq!(results.len(), 3);
        assert!(results["one"].connected);
        assert!(!results["two"].connected);
        assert!(results["nourl"].last_error.as_deref().unwrap_or_default().contains("url"));
        assert!(!h.registry.is_connected("off"));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = ReloadEvent::McpReloadStarted {
            character_id: "alice".into(),
            total_servers: 2,
            estimated_duration_ms: 6_000,
            progress: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "mcp_reload_started");
        assert_eq!(json["characterId"], "alice");
        assert!(json.get("progress").is_none());

        let failed = ReloadEvent::McpReloadFailed {
            character_id: "alice".into(),
            failed_servers: vec!["two".into()],
            error: "two: boom".into(),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["type"], "mcp_reload_failed");
        assert_eq!(json["failedServers"][0], "two");
    }
}
