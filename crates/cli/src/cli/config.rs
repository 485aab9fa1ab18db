use th_domain::config::{Config, ConfigSeverity};
use th_supervisor::{merge_layers, ServerConfigSource};

use crate::bootstrap::Supervisor;

/// Parse and validate the config, then dry-run resolution of every enabled
/// server (globally and per character), printing any issues.
///
/// Returns false when errors are found.
pub fn validate(supervisor: &Supervisor, config_path: &str) -> bool {
    let mut issues = supervisor.config.validate();
    issues.extend(resolve_issues(supervisor));

    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }

    println!("\n{} error(s), {} warning(s) in {config_path}", error_count, warning_count);

    error_count == 0
}

/// Resolve each enabled server against the current folders and sandbox.
fn resolve_issues(supervisor: &Supervisor) -> Vec<th_domain::config::ConfigError> {
    let env = supervisor.configs.env_vars();
    let scopes = std::iter::once(None).chain(supervisor.config.characters.keys().map(|id| Some(id.as_str())));

    let mut issues = Vec::new();
    for character in scopes {
        let merged = merge_layers(&supervisor.configs.layers(character));
        for (name, raw) in merged.iter().filter(|(_, raw)| raw.enabled) {
            if let Err(e) = supervisor.resolver.resolve(name, raw, &env, character) {
                let field = match character {
                    Some(id) => format!("characters.{id}.servers.{name}"),
                    None => format!("mcp.servers.{name}"),
                };
                issues.push(th_domain::config::ConfigError {
                    severity: ConfigSeverity::Error,
                    field,
                    message: e.to_string(),
                });
            }
        }
    }
    issues
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Failed to serialize config: {e}");
            std::process::exit(1);
        }
    }
}
