pub mod call;
pub mod config;
pub mod status;
pub mod watch;

use clap::{Parser, Subcommand};

/// Toolhost: supervisor for MCP tool-provider servers.
#[derive(Debug, Parser)]
#[command(name = "toolhost", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect the configured servers and print their status (default).
    Status {
        /// Character whose servers are layered over the global ones.
        #[arg(long)]
        character: Option<String>,
        /// Print the status map as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Connect the configured servers and list every tool they expose.
    Tools {
        #[arg(long)]
        character: Option<String>,
        /// Print the tool definitions as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Call a single tool and print its result.
    Call {
        /// Server name as it appears in the config.
        server: String,
        /// Tool name exposed by that server.
        tool: String,
        /// Tool arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
        #[arg(long)]
        character: Option<String>,
        /// Print the full tool result as JSON instead of its text.
        #[arg(long)]
        json: bool,
    },
    /// Keep servers connected and reload them when synced folders change.
    Watch {
        #[arg(long)]
        character: Option<String>,
        /// How often the config file is checked for folder changes.
        #[arg(long, default_value = "2")]
        poll_secs: u64,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file, resolve every server and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `TOOLHOST_CONFIG` (or
/// `toolhost.toml` by default). Returns the parsed config and the path
/// that was used.
pub fn load_config() -> anyhow::Result<(th_domain::config::Config, String)> {
    let config_path = std::env::var("TOOLHOST_CONFIG").unwrap_or_else(|_| "toolhost.toml".into());
    let config = read_config(&config_path)?;
    Ok((config, config_path))
}

/// Parse `path`, falling back to defaults when the file does not exist.
pub fn read_config(path: &str) -> anyhow::Result<th_domain::config::Config> {
    if !std::path::Path::new(path).exists() {
        return Ok(th_domain::config::Config::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("reading {path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {path}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = read_config(&path.to_string_lossy()).unwrap();
        assert!(config.mcp.servers.is_empty());
    }

    #[test]
    fn parse_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[mcp.servers.git\n").unwrap();
        let err = read_config(&path.to_string_lossy()).unwrap_err();
        assert!(err.to_string().contains("broken.toml"), "{err}");
    }

    #[test]
    fn call_args_default_to_empty_object() {
        let cli = Cli::parse_from(["toolhost", "call", "files", "read"]);
        match cli.command {
            Some(Command::Call { server, tool, args, character, json }) => {
                assert_eq!(server, "files");
                assert_eq!(tool, "read");
                assert_eq!(args, "{}");
                assert!(character.is_none());
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
