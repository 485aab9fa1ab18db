//! `th-supervisor`: lifecycle supervisor for MCP tool-provider servers.
//!
//! - [`ConfigResolver`] turns templated server entries into launchable ones,
//!   substituting synced folders and environment variables.
//! - [`ConnectionRegistry`] owns one session per server name and prevents
//!   duplicate or racing connects.
//! - [`ReloadCoordinator`] reconnects a character's servers when its folders
//!   change, deferring while scheduled tasks run.
//! - [`ToolExecutor`] calls tools on connected servers under a hard timeout.
//!
//! Collaborators are injected through traits: [`McpConnector`],
//! [`FolderSource`], [`TaskActivity`] and [`ServerConfigSource`].

pub mod connector;
pub mod error;
pub mod executor;
pub mod folders;
pub mod registry;
pub mod reload;
pub mod resolver;
pub mod sandbox;
pub mod source;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testing;

pub use connector::{DefaultConnector, McpConnector, McpSession};
pub use error::{ConfigError, SupervisorError};
pub use executor::ToolExecutor;
pub use folders::{FolderChangeEvent, FolderChangeKind, FolderSource, SyncFolder, SyncFolderBook};
pub use registry::{ConnectionRegistry, ServerStatus};
pub use reload::{ReloadCoordinator, ReloadEvent, ReloadOutcome, ReloadProgress, ReloadStatus, SyncOutcome};
pub use resolver::{ConfigResolver, ResolvedServerConfig, ResolvedTransport};
pub use sandbox::PathSandbox;
pub use source::{enabled_server_names, merge_layers, ConfigLayer, ServerConfigSource, StaticConfigSource};
pub use tasks::{NoTasks, TaskActivity, TaskBoard};
