mod mcp;
mod supervisor;

pub use mcp::*;
pub use supervisor::*;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub mcp: McpConfig,
    /// Per-character server definitions (key = character id).
    #[serde(default)]
    pub characters: BTreeMap<String, CharacterConfig>,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub folders: Vec<SyncFolderConfig>,
    /// Extra substitution variables layered over the process environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good. Placeholders are not
    /// checked here; they can only be resolved against live folder state.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        for (name, server) in &self.mcp.servers {
            validate_server(&format!("mcp.servers.{name}"), server, &mut errors);
        }
        for (character, overrides) in &self.characters {
            for (name, server) in &overrides.servers {
                validate_server(
                    &format!("characters.{character}.servers.{name}"),
                    server,
                    &mut errors,
                );
            }
        }

        if self.supervisor.tool_timeout_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "supervisor.tool_timeout_ms".into(),
                message: "tool timeout must be greater than 0".into(),
            });
        }

        if self.sandbox.data_dir_envs.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "sandbox.data_dir_envs".into(),
                message: "no data directories configured; every folder placeholder will be rejected"
                    .into(),
            });
        }

        // At most one primary folder per character (or globally).
        let mut primaries: BTreeMap<Option<&str>, usize> = BTreeMap::new();
        for folder in self.folders.iter().filter(|f| f.primary) {
            *primaries.entry(folder.character.as_deref()).or_default() += 1;
        }
        for (character, count) in primaries {
            if count > 1 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "folders".into(),
                    message: format!(
                        "{count} folders marked primary for {}",
                        character.unwrap_or("the global scope")
                    ),
                });
            }
        }

        errors
    }
}

fn validate_server(field: &str, server: &McpServerConfig, errors: &mut Vec<ConfigError>) {
    match server.transport_kind() {
        McpTransportKind::Stdio => {
            if server.command.as_deref().map(str::trim).unwrap_or_default().is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("{field}.command"),
                    message: "command must not be empty".into(),
                });
            }
        }
        McpTransportKind::Sse => match server.url.as_deref() {
            None | Some("") => errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: format!("{field}.url"),
                message: "sse servers need either a command or a url".into(),
            }),
            Some(url) if !url.starts_with("http://") && !url.starts_with("https://") && !url.starts_with("${") => {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("{field}.url"),
                    message: format!("url '{url}' is not an http(s) url"),
                });
            }
            Some(_) => {}
        },
    }
}
