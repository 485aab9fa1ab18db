//! Turns raw, templated server entries into launchable configurations.
//!
//! Placeholders, applied in this order:
//! - `${FOLDERS_ARRAY}`: a whole `args` element expands to one argument per
//!   synced folder. Anywhere else it is an error.
//! - `${PRIMARY_FOLDER}`: the character's primary synced folder.
//! - `${ALL_FOLDERS}`: every synced folder, comma separated.
//! - `${VAR}`: looked up in the env map; unknown variables become `""`.
//!
//! Every folder path that ends up in a config passes the [`PathSandbox`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use th_domain::config::{McpServerConfig, McpTransportKind};

use crate::error::ConfigError;
use crate::folders::FolderSource;
use crate::sandbox::PathSandbox;

const PRIMARY_FOLDER: &str = "${PRIMARY_FOLDER}";
const ALL_FOLDERS: &str = "${ALL_FOLDERS}";
const FOLDERS_ARRAY: &str = "${FOLDERS_ARRAY}";

static VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"));

/// Servers that receive folder paths as positional arguments.
pub fn is_filesystem_server(name: &str) -> bool {
    matches!(name, "filesystem" | "filesystem-multi")
}

/// Heuristic for "this argument is a filesystem path" (not a flag, not a
/// package name).
pub fn looks_like_path(arg: &str) -> bool {
    if arg.starts_with('-') {
        return false;
    }
    if arg.starts_with('/') || arg.starts_with('~') || arg.starts_with("./") || arg.starts_with("../") {
        return true;
    }
    // Windows drive letters: `C:\` or `C:/`.
    let bytes = arg.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resolved config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How to reach a server once every placeholder is substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum ResolvedTransport {
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    Sse {
        url: String,
        headers: HashMap<String, String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedServerConfig {
    pub name: String,
    #[serde(flatten)]
    pub transport: ResolvedTransport,
}

impl ResolvedServerConfig {
    pub fn kind(&self) -> McpTransportKind {
        match self.transport {
            ResolvedTransport::Stdio { .. } => McpTransportKind::Stdio,
            ResolvedTransport::Sse { .. } => McpTransportKind::Sse,
        }
    }

    /// Stdio arguments; empty for SSE servers.
    pub fn args(&self) -> &[String] {
        match &self.transport {
            ResolvedTransport::Stdio { args, .. } => args,
            ResolvedTransport::Sse { .. } => &[],
        }
    }

    /// The executable for stdio servers.
    pub fn command(&self) -> Option<&str> {
        match &self.transport {
            ResolvedTransport::Stdio { command, .. } => Some(command),
            ResolvedTransport::Sse { .. } => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ConfigResolver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ConfigResolver {
    folders: Arc<dyn FolderSource>,
    sandbox: PathSandbox,
}

impl ConfigResolver {
    pub fn new(folders: Arc<dyn FolderSource>, sandbox: PathSandbox) -> Self {
        Self { folders, sandbox }
    }

    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    /// Resolve `raw` for `character` (global folders when `None`).
    pub fn resolve(
        &self,
        name: &str,
        raw: &McpServerConfig,
        env_vars: &HashMap<String, String>,
        character: Option<&str>,
    ) -> Result<ResolvedServerConfig, ConfigError> {
        let ctx = Substitution {
            resolver: self,
            server: name,
            env_vars,
            character,
        };

        let transport = match raw.transport_kind() {
            McpTransportKind::Stdio => {
                let command = raw
                    .command
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| ConfigError::MissingField {
                        server: name.to_string(),
                        field: "command",
                    })?;
                let command = ctx.apply(command, "command")?;

                let mut args = Vec::with_capacity(raw.args.len());
                for (i, arg) in raw.args.iter().enumerate() {
                    if arg == FOLDERS_ARRAY {
                        args.extend(ctx.folder_paths(FOLDERS_ARRAY)?);
                    } else {
                        args.push(ctx.apply(arg, &format!("args[{i}]"))?);
                    }
                }

                if is_filesystem_server(name) {
                    self.finish_filesystem_args(&ctx, &mut args)?;
                }

                let mut env = HashMap::with_capacity(raw.env.len());
                for (key, value) in &raw.env {
                    env.insert(key.clone(), ctx.apply(value, &format!("env.{key}"))?);
                }

                ResolvedTransport::Stdio { command, args, env }
            }
            McpTransportKind::Sse => {
                let url = raw
                    .url
                    .as_deref()
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| ConfigError::MissingField {
                        server: name.to_string(),
                        field: "url",
                    })?;
                let url = ctx.apply(url, "url")?;

                let mut headers = HashMap::with_capacity(raw.headers.len());
                for (key, value) in &raw.headers {
                    headers.insert(key.clone(), ctx.apply(value, &format!("headers.{key}"))?);
                }

                ResolvedTransport::Sse { url, headers }
            }
        };

        Ok(ResolvedServerConfig {
            name: name.to_string(),
            transport,
        })
    }

    /// Append folders when a filesystem server has no path argument, then
    /// sandbox-check every path argument.
    fn finish_filesystem_args(&self, ctx: &Substitution<'_>, args: &mut Vec<String>) -> Result<(), ConfigError> {
        if !args.iter().any(|a| looks_like_path(a)) {
            if ctx.server == "filesystem-multi" {
                args.extend(ctx.folder_paths(FOLDERS_ARRAY)?);
            } else {
                args.push(ctx.primary_path()?);
            }
            tracing::debug!(server = ctx.server, character = ?ctx.character, "appended synced folders to filesystem server args");
        }

        for arg in args.iter().filter(|a| looks_like_path(a)) {
            self.sandbox.check(Path::new(arg))?;
        }
        Ok(())
    }
}

/// Per-call substitution state.
struct Substitution<'a> {
    resolver: &'a ConfigResolver,
    server: &'a str,
    env_vars: &'a HashMap<String, String>,
    character: Option<&'a str>,
}

impl Substitution<'_> {
    fn apply(&self, value: &str, location: &str) -> Result<String, ConfigError> {
        if value.contains(FOLDERS_ARRAY) {
            return Err(ConfigError::ArrayPlaceholderMisplaced {
                server: self.server.to_string(),
                location: location.to_string(),
            });
        }

        let mut out = value.to_string();
        if out.contains(PRIMARY_FOLDER) {
            out = out.replace(PRIMARY_FOLDER, &self.primary_path()?);
        }
        if out.contains(ALL_FOLDERS) {
            out = out.replace(ALL_FOLDERS, &self.folder_paths(ALL_FOLDERS)?.join(","));
        }

        Ok(VAR_PATTERN
            .replace_all(&out, |caps: &regex::Captures<'_>| {
                self.env_vars.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned())
    }

    fn primary_path(&self) -> Result<String, ConfigError> {
        let folder = self
            .resolver
            .folders
            .primary_sync_folder(self.character)
            .ok_or_else(|| ConfigError::NoSyncedFolder {
                server: self.server.to_string(),
                placeholder: PRIMARY_FOLDER,
            })?;
        self.resolver.sandbox.check(&folder.path)?;
        Ok(folder.path.to_string_lossy().into_owned())
    }

    fn folder_paths(&self, placeholder: &'static str) -> Result<Vec<String>, ConfigError> {
        let folders = self.resolver.folders.sync_folders(self.character);
        if folders.is_empty() {
            return Err(ConfigError::NoSyncedFolder {
                server: self.server.to_string(),
                placeholder,
            });
        }
        folders
            .iter()
            .map(|f| {
                self.resolver.sandbox.check(&f.path)?;
                Ok(f.path.to_string_lossy().into_owned())
            })
            .collect()
    }
}
