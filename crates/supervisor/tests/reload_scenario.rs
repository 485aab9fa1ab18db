//! End-to-end reload of a character whose folders feed its servers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use th_domain::config::{CharacterConfig, McpServerConfig, SupervisorConfig};
use th_mcp_client::{McpError, McpToolDef, ToolCallResult};
use th_supervisor::{
    ConfigResolver, ConnectionRegistry, McpConnector, McpSession, PathSandbox, ReloadCoordinator,
    ReloadEvent, ReloadOutcome, ResolvedServerConfig, StaticConfigSource, SyncFolderBook, TaskBoard,
    ToolExecutor,
};

/// Records every resolved config it is asked to connect; fails `server2`.
#[derive(Default)]
struct RecordingConnector {
    seen: Mutex<Vec<ResolvedServerConfig>>,
}

struct EchoSession;

#[async_trait]
impl McpSession for EchoSession {
    async fn list_tools(&self) -> Result<Vec<McpToolDef>, McpError> {
        Ok(vec![McpToolDef {
            name: "list_directory".into(),
            description: String::new(),
            input_schema: serde_json::json!({ "type": "object" }),
        }])
    }

    async fn call_tool(&self, _tool: &str, _arguments: Value) -> Result<ToolCallResult, McpError> {
        Ok(ToolCallResult {
            content: Vec::new(),
            is_error: false,
        })
    }

    async fn close(&self) -> Result<(), McpError> {
        Ok(())
    }
}

#[async_trait]
impl McpConnector for RecordingConnector {
    async fn connect(&self, name: &str, config: &ResolvedServerConfig) -> Result<Arc<dyn McpSession>, McpError> {
        self.seen.lock().push(config.clone());
        if name == "server2" {
            return Err(McpError::Protocol("server2 refused the handshake".into()));
        }
        Ok(Arc::new(EchoSession))
    }
}

fn server(args: &[&str]) -> McpServerConfig {
    McpServerConfig {
        command: Some("fake-mcp".into()),
        args: args.iter().map(|a| a.to_string()).collect(),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn reload_with_one_failing_server_is_partial() {
    let data = tempfile::tempdir().unwrap();
    let base = data.path().canonicalize().unwrap();
    let first = base.join("first");
    let second = base.join("second");
    std::fs::create_dir(&first).unwrap();
    std::fs::create_dir(&second).unwrap();

    let folders = Arc::new(SyncFolderBook::new());
    folders.add("alice", &first, true);

    let mut servers = BTreeMap::new();
    servers.insert("server1".to_string(), server(&["--root", "${PRIMARY_FOLDER}"]));
    servers.insert("server2".to_string(), server(&[]));
    servers.insert("server3".to_string(), server(&["${FOLDERS_ARRAY}"]));
    let mut characters = BTreeMap::new();
    characters.insert("alice".to_string(), CharacterConfig { servers });
    let configs = Arc::new(StaticConfigSource::new(BTreeMap::new(), characters, HashMap::new()));

    let connector = Arc::new(RecordingConnector::default());
    let timings = SupervisorConfig::default();
    let registry = Arc::new(ConnectionRegistry::new(connector.clone(), timings.settle_delay()));
    let resolver = Arc::new(ConfigResolver::new(folders.clone(), PathSandbox::new([base.clone()])));
    let coordinator = Arc::new(ReloadCoordinator::new(
        registry.clone(),
        resolver,
        configs,
        Arc::new(TaskBoard::new()),
        &timings,
    ));

    let initial = coordinator.connect_configured(Some("alice")).await;
    assert_eq!(initial.len(), 3);
    assert!(!registry.is_connected("server2"));

    // A second folder arrives; the listener reloads alice's servers.
    let mut events = coordinator.subscribe();
    let listener = coordinator.spawn_listener(folders.subscribe());
    folders.add("alice", &second, false);

    let mut progress = Vec::new();
    let terminal = loop {
        match events.recv().await.unwrap() {
            ReloadEvent::McpReloadStarted { progress: Some(p), .. } => progress.push(p),
            ReloadEvent::McpReloadStarted { .. } => {}
            other => break other,
        }
    };

    match terminal {
        ReloadEvent::McpReloadFailed { failed_servers, error, .. } => {
            assert_eq!(failed_servers, vec!["server2".to_string()]);
            assert!(error.contains("refused"), "{error}");
        }
        other => panic!("expected a failed reload, got {other:?}"),
    }
    assert_eq!(progress.len(), 3);
    assert_eq!(progress.last().map(|p| p.completed_servers), Some(3));

    let status = coordinator.get_reload_status("alice");
    assert!(!status.is_reloading);
    assert_eq!(status.completed_servers, 3);
    assert_eq!(status.failed_servers, vec!["server2".to_string()]);

    assert!(registry.is_connected("server1"));
    assert!(!registry.is_connected("server2"));
    assert!(registry.is_connected("server3"));

    // server3 was re-resolved with both folders.
    let seen = connector.seen.lock().clone();
    let last_server3 = seen.iter().rev().find(|c| c.name == "server3").unwrap();
    assert_eq!(
        last_server3.args(),
        &[first.to_string_lossy().into_owned(), second.to_string_lossy().into_owned()]
    );

    // Tools still run on the surviving servers.
    let executor = ToolExecutor::new(registry.clone(), Duration::from_secs(300));
    executor
        .execute_tool("server1", "list_directory", serde_json::json!({}))
        .await
        .unwrap();

    listener.abort();
    coordinator.cancel_pending();
}

#[tokio::test]
async fn resolve_failure_is_recorded_and_nothing_is_spawned() {
    let outside = tempfile::tempdir().unwrap();
    let sandbox_root = tempfile::tempdir().unwrap();

    let folders = Arc::new(SyncFolderBook::new());
    folders.add("alice", outside.path(), true);

    let mut servers = BTreeMap::new();
    servers.insert("notes".to_string(), server(&["${PRIMARY_FOLDER}"]));
    let mut characters = BTreeMap::new();
    characters.insert("alice".to_string(), CharacterConfig { servers });
    let configs = Arc::new(StaticConfigSource::new(BTreeMap::new(), characters, HashMap::new()));

    let connector = Arc::new(RecordingConnector::default());
    let registry = Arc::new(ConnectionRegistry::new(connector.clone(), Duration::ZERO));
    let resolver = Arc::new(ConfigResolver::new(
        folders.clone(),
        PathSandbox::new([sandbox_root.path().to_path_buf()]),
    ));
    let coordinator = Arc::new(ReloadCoordinator::new(
        registry.clone(),
        resolver,
        configs,
        Arc::new(TaskBoard::new()),
        &SupervisorConfig::default(),
    ));

    let results = coordinator.connect_configured(Some("alice")).await;
    let (_, status) = &results[0];
    assert!(!status.connected);
    assert!(status.last_error.as_deref().unwrap_or_default().contains("outside"));
    assert!(connector.seen.lock().is_empty());

    // Still associated with alice, so a reload retries (and fails) it.
    let outcome = coordinator.reconnect_character("alice").await;
    assert_eq!(
        outcome,
        ReloadOutcome::Completed {
            total: 1,
            failed: vec!["notes".to_string()]
        }
    );
    assert!(connector.seen.lock().is_empty());
}
