use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supervisor timings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Timing knobs for the connection supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Pause between tearing down a server and launching its replacement,
    /// so the OS can release ports and file handles (ms).
    #[serde(default = "d_500")]
    pub settle_delay_ms: u64,
    /// Hard timeout for a single tool call (ms).
    #[serde(default = "d_300000")]
    pub tool_timeout_ms: u64,
    /// Timeout for opening an SSE stream and receiving its endpoint (ms).
    #[serde(default = "d_10000")]
    pub sse_connect_timeout_ms: u64,
    /// Cool-down before retrying a reload or config sync that was deferred
    /// because scheduled tasks were running (ms).
    #[serde(default = "d_60000")]
    pub defer_window_ms: u64,
    /// Per-server duration used to estimate how long a reload will take (ms).
    #[serde(default = "d_3000")]
    pub reload_estimate_per_server_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 500,
            tool_timeout_ms: 300_000,
            sse_connect_timeout_ms: 10_000,
            defer_window_ms: 60_000,
            reload_estimate_per_server_ms: 3_000,
        }
    }
}

impl SupervisorConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn sse_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.sse_connect_timeout_ms)
    }

    pub fn defer_window(&self) -> Duration {
        Duration::from_millis(self.defer_window_ms)
    }

    pub fn reload_estimate_per_server(&self) -> Duration {
        Duration::from_millis(self.reload_estimate_per_server_ms)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sandbox
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Filesystem sandbox for resolved server paths.
///
/// Each listed environment variable names a data directory; every folder
/// path handed to a tool server must live under one of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "d_data_dir_envs")]
    pub data_dir_envs: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            data_dir_envs: d_data_dir_envs(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Synced folders
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A statically configured synced folder (`[[folders]]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncFolderConfig {
    /// Owning character; `None` registers a global folder.
    #[serde(default)]
    pub character: Option<String>,
    pub path: PathBuf,
    #[serde(default)]
    pub primary: bool,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_500() -> u64 {
    500
}
fn d_3000() -> u64 {
    3_000
}
fn d_10000() -> u64 {
    10_000
}
fn d_60000() -> u64 {
    60_000
}
fn d_300000() -> u64 {
    300_000
}
fn d_data_dir_envs() -> Vec<String> {
    vec!["TOOLHOST_DATA_DIR".into(), "TOOLHOST_SYNC_ROOT".into()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timings() {
        let cfg = SupervisorConfig::default();
        assert_eq!(cfg.settle_delay(), Duration::from_millis(500));
        assert_eq!(cfg.tool_timeout(), Duration::from_secs(300));
        assert_eq!(cfg.defer_window(), Duration::from_secs(60));
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let cfg: SupervisorConfig = serde_json::from_str(r#"{ "settle_delay_ms": 0 }"#).unwrap();
        assert_eq!(cfg.settle_delay_ms, 0);
        assert_eq!(cfg.tool_timeout_ms, 300_000);
    }

    #[test]
    fn sandbox_defaults_to_data_dir_envs() {
        let cfg = SandboxConfig::default();
        assert!(cfg.data_dir_envs.contains(&"TOOLHOST_DATA_DIR".to_string()));
    }
}
