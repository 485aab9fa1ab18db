//! Where raw server definitions come from, and how layers combine.

use std::collections::{BTreeMap, HashMap};

use th_domain::config::{CharacterConfig, Config, McpServerConfig};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Layers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One source of server definitions.
#[derive(Debug, Clone)]
pub enum ConfigLayer {
    /// Servers shared by every character.
    Global(BTreeMap<String, McpServerConfig>),
    /// Servers that apply only to one character.
    Character {
        id: String,
        servers: BTreeMap<String, McpServerConfig>,
    },
}

impl ConfigLayer {
    fn servers(&self) -> &BTreeMap<String, McpServerConfig> {
        match self {
            Self::Global(servers) => servers,
            Self::Character { servers, .. } => servers,
        }
    }
}

/// Merge layers in order. A later entry with the same name replaces the
/// earlier one in place, so the result keeps first-seen order.
pub fn merge_layers(layers: &[ConfigLayer]) -> Vec<(String, McpServerConfig)> {
    let mut merged: Vec<(String, McpServerConfig)> = Vec::new();
    for layer in layers {
        for (name, server) in layer.servers() {
            match merged.iter_mut().find(|(n, _)| n == name) {
                Some(slot) => slot.1 = server.clone(),
                None => merged.push((name.clone(), server.clone())),
            }
        }
    }
    merged
}

/// Names of the enabled servers in a merged list.
pub fn enabled_server_names(merged: &[(String, McpServerConfig)]) -> Vec<String> {
    merged
        .iter()
        .filter(|(_, s)| s.enabled)
        .map(|(n, _)| n.clone())
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ServerConfigSource
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Provides server definitions and substitution variables.
pub trait ServerConfigSource: Send + Sync {
    /// Layers for a character, lowest precedence first. `None` yields only
    /// the global layer.
    fn layers(&self, character: Option<&str>) -> Vec<ConfigLayer>;

    /// Variables available to `${VAR}` placeholders.
    fn env_vars(&self) -> HashMap<String, String>;
}

/// A fixed snapshot taken from the loaded config file.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    global: BTreeMap<String, McpServerConfig>,
    characters: BTreeMap<String, CharacterConfig>,
    env: HashMap<String, String>,
}

impl StaticConfigSource {
    /// Snapshot `config`; `[env]` entries override the process environment.
    pub fn from_config(config: &Config) -> Self {
        let mut env: HashMap<String, String> = std::env::vars().collect();
        env.extend(config.env.clone());
        Self {
            global: config.mcp.servers.clone(),
            characters: config.characters.clone(),
            env,
        }
    }

    pub fn new(
        global: BTreeMap<String, McpServerConfig>,
        characters: BTreeMap<String, CharacterConfig>,
        env: HashMap<String, String>,
    ) -> Self {
        Self {
            global,
            characters,
            env,
        }
    }
}

impl ServerConfigSource for StaticConfigSource {
    fn layers(&self, character: Option<&str>) -> Vec<ConfigLayer> {
        let mut layers = vec![ConfigLayer::Global(self.global.clone())];
        if let Some(id) = character {
            if let Some(overrides) = self.characters.get(id) {
                layers.push(ConfigLayer::Character {
                    id: id.to_string(),
                    servers: overrides.servers.clone(),
                });
            }
        }
        layers
    }

    fn env_vars(&self) -> HashMap<String, String> {
        self.env.clone()
    }
}
