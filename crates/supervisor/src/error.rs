use std::path::PathBuf;
use std::time::Duration;

use th_mcp_client::McpError;

/// Errors raised while turning a raw server entry into a launchable one.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("server '{server}' is missing required field '{field}'")]
    MissingField { server: String, field: &'static str },

    #[error("server '{server}' uses {placeholder} but no synced folder is available")]
    NoSyncedFolder {
        server: String,
        placeholder: &'static str,
    },

    #[error("server '{server}': ${{FOLDERS_ARRAY}} must be a whole argument on its own (found in {location})")]
    ArrayPlaceholderMisplaced { server: String, location: String },

    #[error("path '{}' is outside every allowed data directory", path.display())]
    OutsideSandbox { path: PathBuf },

    #[error("no allowed data directories are configured; refusing to hand folder paths to tool servers")]
    NoSandboxBases,

    #[error("invalid path '{}': {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    #[error("filesystem server '{server}' has no folder argument; register a synced folder or pass a path")]
    NoFilesystemPath { server: String },
}

/// Errors surfaced by the connection supervisor.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(
        "executable '{command}' for server '{server}' was not found. \
         Install it (Node.js provides `npx`, `uv` provides `uvx`) or set `command` \
         to an absolute path, then make sure it is on PATH"
    )]
    ExecutableNotFound { server: String, command: String },

    #[error("server '{0}' is not connected")]
    NotConnected(String),

    #[error("tool '{tool}' on server '{server}' timed out after {}s", timeout.as_secs())]
    Timeout {
        server: String,
        tool: String,
        timeout: Duration,
    },

    #[error("tool '{tool}' on server '{server}' was cancelled")]
    Cancelled { server: String, tool: String },

    #[error(transparent)]
    Mcp(#[from] McpError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misplaced_array_message_names_placeholder() {
        let err = ConfigError::ArrayPlaceholderMisplaced {
            server: "fs".into(),
            location: "args[1]".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("${FOLDERS_ARRAY}"));
        assert!(msg.contains("args[1]"));
    }

    #[test]
    fn not_found_message_is_actionable() {
        let err = SupervisorError::ExecutableNotFound {
            server: "git".into(),
            command: "uvx".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'uvx'"));
        assert!(msg.contains("PATH"));
    }

    #[test]
    fn timeout_message_reports_seconds() {
        let err = SupervisorError::Timeout {
            server: "s".into(),
            tool: "t".into(),
            timeout: Duration::from_secs(300),
        };
        assert!(err.to_string().contains("300s"));
    }
}
