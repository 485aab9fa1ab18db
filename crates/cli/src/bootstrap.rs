//! Composition root: builds the supervisor pieces once and wires them
//! together explicitly.

use std::sync::Arc;

use th_domain::config::Config;
use th_supervisor::{
    ConfigResolver, ConnectionRegistry, DefaultConnector, McpConnector, PathSandbox, ReloadCoordinator,
    ServerConfigSource, StaticConfigSource, SyncFolderBook, TaskBoard, ToolExecutor,
};

/// Everything a command needs, built once per process.
pub struct Supervisor {
    pub config: Arc<Config>,
    pub folders: Arc<SyncFolderBook>,
    pub tasks: Arc<TaskBoard>,
    pub configs: Arc<StaticConfigSource>,
    pub resolver: Arc<ConfigResolver>,
    pub registry: Arc<ConnectionRegistry>,
    pub executor: Arc<ToolExecutor>,
    pub reload: Arc<ReloadCoordinator>,
}

/// Build the supervisor with the real stdio/SSE connector.
pub fn build_supervisor(config: Arc<Config>) -> Supervisor {
    let connector = Arc::new(DefaultConnector::new(config.supervisor.sse_connect_timeout()));
    build_supervisor_with(config, connector)
}

pub fn build_supervisor_with(config: Arc<Config>, connector: Arc<dyn McpConnector>) -> Supervisor {
    let timings = &config.supervisor;

    let configs = Arc::new(StaticConfigSource::from_config(&config));
    let env = configs.env_vars();
    let sandbox = PathSandbox::from_env_names(&config.sandbox.data_dir_envs, |name| env.get(name).cloned());
    tracing::debug!(bases = ?sandbox.bases(), "sandbox configured");

    let folders = Arc::new(SyncFolderBook::from_config(&config.folders));
    let tasks = Arc::new(TaskBoard::new());
    let resolver = Arc::new(ConfigResolver::new(folders.clone(), sandbox));
    let registry = Arc::new(ConnectionRegistry::new(connector, timings.settle_delay()));
    let executor = Arc::new(ToolExecutor::new(registry.clone(), timings.tool_timeout()));
    let reload = Arc::new(ReloadCoordinator::new(
        registry.clone(),
        resolver.clone(),
        configs.clone(),
        tasks.clone(),
        timings,
    ));

    Supervisor {
        config,
        folders,
        tasks,
        configs,
        resolver,
        registry,
        executor,
        reload,
    }
}

impl Supervisor {
    /// Cancel deferred work and close every session.
    pub async fn shutdown(&self) {
        self.reload.cancel_pending();
        self.registry.disconnect_all().await;
    }
}
