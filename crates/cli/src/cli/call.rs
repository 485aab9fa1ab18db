//! `toolhost call`: connect one server, run one tool, print the result.

use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;
use th_domain::config::Config;
use th_supervisor::{merge_layers, ServerConfigSource};
use tokio_util::sync::CancellationToken;

use crate::bootstrap::build_supervisor;

pub async fn call(
    config: Arc<Config>,
    server: String,
    tool: String,
    args: String,
    character: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let arguments = parse_arguments(&args)?;
    let supervisor = build_supervisor(config);
    let character = character.as_deref();

    let merged = merge_layers(&supervisor.configs.layers(character));
    let raw = merged
        .iter()
        .find(|(name, _)| *name == server)
        .map(|(_, raw)| raw)
        .with_context(|| format!("MCP server '{server}' is not configured"))?;
    if !raw.enabled {
        anyhow::bail!("MCP server '{server}' is disabled");
    }

    let resolved = supervisor
        .resolver
        .resolve(&server, raw, &supervisor.configs.env_vars(), character)?;
    let status = supervisor.registry.connect(&server, resolved, character).await;
    if !status.connected {
        supervisor.shutdown().await;
        anyhow::bail!(
            "MCP server '{server}' failed to connect: {}",
            status.last_error.unwrap_or_default()
        );
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let outcome = supervisor
        .executor
        .execute_tool_with_cancel(&server, &tool, arguments, &cancel)
        .await;
    on_ctrl_c.abort();
    supervisor.shutdown().await;

    let result = outcome?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.text());
    }
    if result.is_error {
        anyhow::bail!("tool '{tool}' on '{server}' reported an error");
    }
    Ok(())
}

/// Tool arguments must be a JSON object.
fn parse_arguments(raw: &str) -> anyhow::Result<Value> {
    let value: Value = serde_json::from_str(raw).context("--args is not valid JSON")?;
    if !value.is_object() {
        anyhow::bail!("--args must be a JSON object");
    }
    Ok(value)
}
