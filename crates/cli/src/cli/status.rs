//! `toolhost status` and `toolhost tools`: connect, report, disconnect.

use std::sync::Arc;

use th_domain::config::Config;
use th_supervisor::ServerStatus;

use crate::bootstrap::build_supervisor;

pub async fn status(config: Arc<Config>, character: Option<String>, json: bool) -> anyhow::Result<()> {
    let supervisor = build_supervisor(config);
    let results = supervisor.reload.connect_configured(character.as_deref()).await;
    supervisor.shutdown().await;

    if json {
        let map: std::collections::BTreeMap<_, _> = results.into_iter().collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No MCP servers configured.");
        return Ok(());
    }
    for (name, status) in &results {
        println!("{}", status_line(name, status));
    }
    Ok(())
}

pub async fn tools(config: Arc<Config>, character: Option<String>, json: bool) -> anyhow::Result<()> {
    let supervisor = build_supervisor(config);
    let results = supervisor.reload.connect_configured(character.as_deref()).await;
    let tools = supervisor.registry.get_all_tools();
    supervisor.shutdown().await;

    for (name, status) in results.iter().filter(|(_, s)| !s.connected) {
        eprintln!("warning: {}", status_line(name, status));
    }

    if json {
        let entries: Vec<_> = tools
            .iter()
            .map(|(server, tool)| {
                serde_json::json!({
                    "server": server,
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": tool.input_schema,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for (server, tool) in &tools {
        let summary = tool.description.lines().next().unwrap_or_default();
        if summary.is_empty() {
            println!("{server}/{}", tool.name);
        } else {
            println!("{server}/{}  {summary}", tool.name);
        }
    }
    Ok(())
}

fn status_line(name: &str, status: &ServerStatus) -> String {
    if status.connected {
        format!("{name:<24} connected     {} tool(s)", status.tool_count)
    } else {
        format!(
            "{name:<24} disconnected  {}",
            status.last_error.as_deref().unwrap_or("not connected")
        )
    }
}
